//! Secure memory wrappers for key material and decrypted plaintext.
//!
//! Two types cover the crate's needs:
//! - [`SecretBuffer`] — variable-length (decrypted credential fields)
//! - [`SecretBytes<N>`] — fixed-length (the master key)
//!
//! Both zero their contents on drop and mask `Debug`/`Display` output.
//! On Unix the backing pages are `mlock`'d best-effort so secrets are not
//! swapped to disk; failure to lock is tolerated (quota, privileges).

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Best-effort page locking
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn try_mlock(ptr: *const u8, len: usize) -> bool {
    if len == 0 {
        return true;
    }
    // SAFETY: mlock accepts any valid pointer/length pair; on failure the
    // kernel returns an error code which we treat as "not locked".
    unsafe { libc::mlock(ptr.cast(), len) == 0 }
}

#[cfg(unix)]
fn try_munlock(ptr: *const u8, len: usize) {
    if len == 0 {
        return;
    }
    // SAFETY: munlock on an unlocked or stale region is a harmless error.
    unsafe {
        libc::munlock(ptr.cast(), len);
    }
}

#[cfg(not(unix))]
fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
    false
}

#[cfg(not(unix))]
fn try_munlock(_ptr: *const u8, _len: usize) {}

/// Guard holding an `mlock`'d region; unlocks on drop.
struct PageLock {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only passed to mlock/munlock syscalls; the data
// itself is owned and accessed through the enclosing secret type.
unsafe impl Send for PageLock {}
unsafe impl Sync for PageLock {}

impl PageLock {
    fn acquire(ptr: *const u8, len: usize) -> Self {
        Self {
            ptr,
            len,
            locked: try_mlock(ptr, len),
        }
    }

    const fn none() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            locked: false,
        }
    }
}

impl Drop for PageLock {
    fn drop(&mut self) {
        if self.locked {
            try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer — variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data (decrypted field plaintext).
///
/// Wraps [`SecretSlice<u8>`] from `secrecy`, which zeroizes on drop, and
/// adds best-effort page locking plus masked formatting.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    _lock: PageLock,
}

impl SecretBuffer {
    /// Copy `data` into a fresh secret allocation.
    ///
    /// The caller should zeroize the source after calling this.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if allocation fails.
    pub fn new(data: &[u8]) -> Result<Self, CryptoError> {
        let inner: SecretSlice<u8> = data.to_vec().into();
        let exposed = inner.expose_secret();
        let lock = PageLock::acquire(exposed.as_ptr(), exposed.len());
        Ok(Self { inner, _lock: lock })
    }

    /// Expose the underlying bytes. Keep the borrow short-lived.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Interpret the buffer as UTF-8, for fields that are known strings.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the bytes are not valid UTF-8.
    pub fn expose_str(&self) -> Result<&str, CryptoError> {
        std::str::from_utf8(self.expose())
            .map_err(|_| CryptoError::SecureMemory("secret buffer is not valid UTF-8".into()))
    }

    /// Number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N> — fixed-size
// ---------------------------------------------------------------------------

/// Fixed-size secret, used for the 32-byte master key.
///
/// Zeroized on drop via the `zeroize` derives. The page lock targets the
/// address at construction time; if the value is moved afterwards the lock
/// is stale, which is acceptable because locking is best-effort and the
/// zeroize-on-drop guarantee is independent of it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
    #[zeroize(skip)]
    lock: PageLock,
}

impl<const N: usize> SecretBytes<N> {
    /// Take ownership of a fixed-size array as secret material.
    #[must_use]
    pub fn new(data: [u8; N]) -> Self {
        let mut s = Self {
            bytes: data,
            lock: PageLock::none(),
        };
        s.lock = PageLock::acquire(s.bytes.as_ptr(), N);
        s
    }

    /// Fill with cryptographically random bytes from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; N];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        let s = Self::new(bytes);
        bytes.zeroize();
        Ok(s)
    }

    /// Reconstruct from a slice, e.g. bytes fetched back from the OS
    /// keystore.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the slice is not
    /// exactly `N` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != N {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected {N} bytes, got {}",
                data.len()
            )));
        }
        let mut arr = [0u8; N];
        arr.copy_from_slice(data);
        let s = Self::new(arr);
        arr.zeroize();
        Ok(s)
    }

    /// Expose the raw bytes for a cryptographic operation.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> From<[u8; N]> for SecretBytes<N> {
    fn from(data: [u8; N]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
