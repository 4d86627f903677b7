//! `coffre-crypto-core` — Pure cryptographic primitives for COFFRE.
//!
//! This crate is the audit target: zero network, zero async, zero platform
//! UI dependencies. Everything above it (keystore custody, the credential
//! repository, the unlock state machine) lives in `coffre-vault`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod cipher;
pub mod error;
pub mod memory;

pub use cipher::{decrypt, encrypt, SealedField, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use memory::{SecretBuffer, SecretBytes};

/// Master key length in bytes (256 bits).
pub const MASTER_KEY_LEN: usize = 32;

/// The single symmetric key under which all credential fields are sealed.
///
/// Zeroized on drop. Generation and custody belong to the keystore layer;
/// this crate only consumes it for seal/open operations.
pub type MasterKey = SecretBytes<MASTER_KEY_LEN>;
