//! Clipboard staging — one staged secret at a time, careful clearing.
//!
//! The system clipboard is a process-wide resource the vault cannot
//! fence off; all this layer guarantees is that it knows what *it* last
//! wrote. Staging a new value supersedes the previous slot (no history),
//! and [`ClipboardStaging::clear`] re-reads the clipboard first so a
//! value the user copied elsewhere in the meantime is never clobbered.
//!
//! No automatic expiry lives here — a time-based auto-clear is a policy
//! the caller layers on top of `clear`.

use std::sync::Mutex;

use tracing::debug;
use zeroize::Zeroize;

use crate::credential::FieldTag;
use crate::error::VaultError;

// ---------------------------------------------------------------------------
// System clipboard boundary
// ---------------------------------------------------------------------------

/// System clipboard boundary: `set` / `get` of plain text.
pub trait SystemClipboard: Send + Sync {
    /// Replace the clipboard contents.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Clipboard`] if the platform write fails.
    fn set(&self, text: &str) -> Result<(), VaultError>;

    /// Read the current clipboard contents.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Clipboard`] if the platform read fails.
    fn get(&self) -> Result<String, VaultError>;
}

/// In-memory [`SystemClipboard`] fake for tests and headless use.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<String>,
}

impl MemoryClipboard {
    /// Create an empty in-memory clipboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SystemClipboard for MemoryClipboard {
    fn set(&self, text: &str) -> Result<(), VaultError> {
        let mut contents = self
            .contents
            .lock()
            .map_err(|_| VaultError::Clipboard("clipboard mutex poisoned".into()))?;
        // The previous contents may be a staged secret.
        let mut old = std::mem::replace(&mut *contents, text.to_string());
        old.zeroize();
        Ok(())
    }

    fn get(&self) -> Result<String, VaultError> {
        self.contents
            .lock()
            .map(|c| c.clone())
            .map_err(|_| VaultError::Clipboard("clipboard mutex poisoned".into()))
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

struct StagedSlot {
    value: String,
    source: FieldTag,
}

impl Drop for StagedSlot {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Tracks the single "currently staged" clipboard value.
pub struct ClipboardStaging<C: SystemClipboard> {
    clipboard: C,
    slot: Mutex<Option<StagedSlot>>,
}

impl<C: SystemClipboard> ClipboardStaging<C> {
    /// Wrap a system clipboard handle.
    #[must_use]
    pub fn new(clipboard: C) -> Self {
        Self {
            clipboard,
            slot: Mutex::new(None),
        }
    }

    /// Write `value` to the system clipboard and record it as the
    /// current slot, superseding any prior staged value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Clipboard`] if the platform write fails;
    /// the slot is only updated on success.
    pub fn stage(&self, value: &str, source: FieldTag) -> Result<(), VaultError> {
        self.clipboard.set(value)?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| VaultError::Clipboard("staging mutex poisoned".into()))?;
        *slot = Some(StagedSlot {
            value: value.to_string(),
            source,
        });
        debug!(field = ?source, "clipboard value staged");
        Ok(())
    }

    /// Empty the clipboard, but only if it still holds the staged value
    /// — an externally copied value is left alone. The slot is forgotten
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Clipboard`] if the platform read or write
    /// fails.
    pub fn clear(&self) -> Result<(), VaultError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| VaultError::Clipboard("staging mutex poisoned".into()))?;
        if let Some(staged) = slot.take() {
            let mut current = self.clipboard.get()?;
            if current == staged.value {
                self.clipboard.set("")?;
                debug!("staged clipboard value cleared");
            }
            current.zeroize();
        }
        Ok(())
    }

    /// Which field the currently staged value came from, if any.
    #[must_use]
    pub fn staged_source(&self) -> Option<FieldTag> {
        self.slot
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.source))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
