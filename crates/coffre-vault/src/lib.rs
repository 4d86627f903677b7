//! `coffre-vault` — Credential store business logic for COFFRE.
//!
//! The security-relevant engine of the vault: master-key custody against
//! the platform keystore, the sealed credential repository, the
//! unlock/lock state machine that is the sole gate on decryption, and
//! the clipboard staging slot. The presentation layer consumes these as
//! injected capability handles; every platform singleton (keystore,
//! authenticator, clipboard) is a trait with an in-memory fake.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clipboard;
pub mod credential;
pub mod error;
pub mod gate;
pub mod keystore;
pub mod preferences;
pub mod repository;
pub mod store;
pub mod unlock;

pub use clipboard::{ClipboardStaging, MemoryClipboard, SystemClipboard};
pub use credential::{derive_identifier, AccountCredential, CredentialDraft, FieldTag};
pub use error::VaultError;
pub use gate::{AuthOutcome, BiometricGate, DenialCause, DeviceAuthenticator, UnavailableAuthenticator};
pub use keystore::{KeystoreBackend, MemoryKeyring, OsKeyring, SecureKeyStore};
pub use preferences::Preferences;
pub use repository::CredentialRepository;
pub use store::RecordStore;
pub use unlock::{UnlockState, UnlockStateMachine};
