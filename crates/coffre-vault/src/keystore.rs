//! Master key custody — fetch-or-create against the platform keystore.
//!
//! The master key never leaves the keystore boundary in serialized form
//! except through [`KeystoreBackend`], which is assumed to be the
//! platform's tamper-resistant storage (macOS Keychain, Windows
//! Credential Manager, Secret Service). In-process the key only exists
//! as a zeroize-on-drop [`MasterKey`] shared behind an `Arc` for the
//! duration of an unlock session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use coffre_crypto_core::MasterKey;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Keystore boundary
// ---------------------------------------------------------------------------

/// Platform secure keystore boundary: `put` / `get` / `delete` of raw
/// secret bytes keyed by `(service, account)`.
///
/// Implementations must be injectable at construction so tests can
/// substitute [`MemoryKeyring`].
pub trait KeystoreBackend: Send + Sync {
    /// Store (or overwrite) the secret bytes for `(service, account)`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] if the platform store
    /// cannot be reached.
    fn put(&self, service: &str, account: &str, secret: &[u8]) -> Result<(), VaultError>;

    /// Fetch the secret bytes, or `None` if no entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] if the platform store
    /// cannot be reached. Absence is not an error.
    fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>, VaultError>;

    /// Remove the entry. Removing a nonexistent entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] if the platform store
    /// cannot be reached.
    fn delete(&self, service: &str, account: &str) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// OS keyring backend
// ---------------------------------------------------------------------------

/// Production backend over the OS keyring (via the `keyring` crate).
pub struct OsKeyring;

impl OsKeyring {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(service, account)
            .map_err(|e| VaultError::KeyStoreUnavailable(format!("keyring init: {e}")))
    }
}

impl KeystoreBackend for OsKeyring {
    fn put(&self, service: &str, account: &str, secret: &[u8]) -> Result<(), VaultError> {
        Self::entry(service, account)?
            .set_secret(secret)
            .map_err(|e| VaultError::KeyStoreUnavailable(format!("keyring write: {e}")))
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match Self::entry(service, account)?.get_secret() {
            Ok(bytes) => Ok(Some(bytes)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!(
                "keyring read: {e}"
            ))),
        }
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), VaultError> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::KeyStoreUnavailable(format!(
                "keyring delete: {e}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend (tests, headless environments)
// ---------------------------------------------------------------------------

/// In-memory [`KeystoreBackend`] fake. Secrets live in a `HashMap` and
/// are zeroized when overwritten or deleted.
#[derive(Default)]
pub struct MemoryKeyring {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryKeyring {
    /// Create an empty in-memory keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeystoreBackend for MemoryKeyring {
    fn put(&self, service: &str, account: &str, secret: &[u8]) -> Result<(), VaultError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::KeyStoreUnavailable("keyring mutex poisoned".into()))?;
        if let Some(mut old) = entries.insert(
            (service.to_string(), account.to_string()),
            secret.to_vec(),
        ) {
            old.zeroize();
        }
        Ok(())
    }

    fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::KeyStoreUnavailable("keyring mutex poisoned".into()))?;
        Ok(entries
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), VaultError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::KeyStoreUnavailable("keyring mutex poisoned".into()))?;
        if let Some(mut old) = entries.remove(&(service.to_string(), account.to_string())) {
            old.zeroize();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SecureKeyStore
// ---------------------------------------------------------------------------

/// Default keystore service identifier.
pub const DEFAULT_SERVICE_ID: &str = "app.coffre.vault";

/// Default keystore account identifier for the master key entry.
pub const DEFAULT_ACCOUNT_ID: &str = "master-key";

/// Owns the master key's lifetime: creates it on first use, fetches it
/// on later unlocks, deletes it on wipe.
pub struct SecureKeyStore {
    backend: Arc<dyn KeystoreBackend>,
    service_id: String,
    account_id: String,
    // Serializes ensure_key so concurrent first unlocks converge on one key.
    generation: Mutex<()>,
}

impl SecureKeyStore {
    /// Create a keystore over the given backend with the default
    /// service/account identifiers.
    #[must_use]
    pub fn new(backend: Arc<dyn KeystoreBackend>) -> Self {
        Self::with_ids(backend, DEFAULT_SERVICE_ID, DEFAULT_ACCOUNT_ID)
    }

    /// Create a keystore with explicit service/account identifiers
    /// (multiple vaults under one OS account).
    #[must_use]
    pub fn with_ids(backend: Arc<dyn KeystoreBackend>, service_id: &str, account_id: &str) -> Self {
        Self {
            backend,
            service_id: service_id.to_string(),
            account_id: account_id.to_string(),
            generation: Mutex::new(()),
        }
    }

    /// Return the existing master key, or atomically generate and
    /// persist a new 256-bit one if none exists.
    ///
    /// Generation is exactly-once: concurrent callers serialize on an
    /// internal mutex and all observe the same key.
    ///
    /// # Errors
    ///
    /// - [`VaultError::KeyStoreUnavailable`] if the platform keystore
    ///   cannot be reached.
    /// - [`VaultError::Crypto`] if the stored bytes are not a valid
    ///   256-bit key or the CSPRNG fails.
    pub fn ensure_key(&self) -> Result<Arc<MasterKey>, VaultError> {
        let _guard = self
            .generation
            .lock()
            .map_err(|_| VaultError::KeyStoreUnavailable("keystore mutex poisoned".into()))?;

        if let Some(mut bytes) = self.backend.get(&self.service_id, &self.account_id)? {
            let key = MasterKey::from_slice(&bytes);
            bytes.zeroize();
            return Ok(Arc::new(key?));
        }

        let key = MasterKey::random().map_err(VaultError::Crypto)?;
        self.backend
            .put(&self.service_id, &self.account_id, key.expose())?;
        debug!(service = %self.service_id, "generated new master key");
        Ok(Arc::new(key))
    }

    /// Irreversibly remove the master key from persistent storage.
    ///
    /// Does not touch encrypted records; after this call all existing
    /// ciphertext is permanently undecryptable. This is the intended
    /// wipe semantic — the key is gone, not rotated.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeyStoreUnavailable`] if the platform
    /// keystore cannot be reached.
    pub fn delete_key(&self) -> Result<(), VaultError> {
        let _guard = self
            .generation
            .lock()
            .map_err(|_| VaultError::KeyStoreUnavailable("keystore mutex poisoned".into()))?;
        self.backend.delete(&self.service_id, &self.account_id)?;
        warn!(service = %self.service_id, "master key deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
