//! Vault error types for `coffre-vault`.

use thiserror::Error;

use coffre_crypto_core::CryptoError;

use crate::gate::DenialCause;

/// Errors produced by vault operations.
///
/// Every operation returns a typed result; nothing is swallowed. Only an
/// unreadable persisted collection is unrecoverable for the session, and
/// even then the keystore state is left intact for a later attempt.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    /// `CryptoError::Decryption` means a record's ciphertext failed its
    /// integrity check — surface the record as unreadable, do not drop it.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The platform secure keystore cannot be reached (device not
    /// provisioned, locked session bus, ...). Fatal to the unlock
    /// attempt; surfaced for explicit retry, never retried internally.
    #[error("secure keystore unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// Device authentication resolved negatively. Non-fatal; the vault
    /// stays locked and the caller may retry.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(DenialCause),

    /// The user dismissed the authentication ceremony. Non-fatal.
    #[error("authentication canceled")]
    AuthenticationCanceled,

    /// A second authentication was requested while one is pending.
    /// Reentrancy guard rejection — not queued, not retried immediately.
    #[error("authentication already in progress")]
    AuthenticationInProgress,

    /// Caller input failed a write-time precondition. Rejected before
    /// any encryption or persistence occurs.
    #[error("validation failed: {0} must not be empty")]
    Validation(&'static str),

    /// Mutation or lookup referenced a nonexistent record.
    #[error("credential not found: {0}")]
    NotFound(String),

    /// A repository operation was attempted while the vault is locked.
    #[error("vault is locked")]
    Locked,

    /// Persistent record store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// System clipboard boundary failure.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// I/O error from the filesystem (preferences file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
