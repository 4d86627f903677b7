//! Credential domain model, write-time validation, and field sealing.
//!
//! An [`AccountCredential`] carries plaintext metadata (`title`,
//! `identifier`) and two opaque sealed blobs for the secret fields. The
//! decrypted views are never stored — the repository produces them on
//! demand as [`SecretBuffer`]s.

use coffre_crypto_core::cipher::{self, SealedField};
use coffre_crypto_core::{MasterKey, SecretBuffer};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::VaultError;

/// Domain separation tag for sealed username fields.
const USERNAME_AAD: &[u8] = b"coffre-credential-username-v1";

/// Domain separation tag for sealed password fields.
const PASSWORD_AAD: &[u8] = b"coffre-credential-password-v1";

// ---------------------------------------------------------------------------
// Domain model
// ---------------------------------------------------------------------------

/// Which secret field a plaintext value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTag {
    /// The credential's username field.
    Username,
    /// The credential's password field.
    Password,
}

impl FieldTag {
    pub(crate) const fn aad(self) -> &'static [u8] {
        match self {
            Self::Username => USERNAME_AAD,
            Self::Password => PASSWORD_AAD,
        }
    }
}

/// One stored credential record — ciphertext at rest.
#[derive(Debug, Clone)]
pub struct AccountCredential {
    /// Stable identity, assigned at creation, unique within the vault.
    pub id: String,
    /// Display label. Non-empty, not unique.
    pub title: String,
    /// Informational slug derived from the title unless overridden.
    pub identifier: String,
    /// Sealed username blob (`nonce || ciphertext || tag`).
    pub username_ciphertext: Vec<u8>,
    /// Sealed password blob (`nonce || ciphertext || tag`).
    pub password_ciphertext: Vec<u8>,
}

impl AccountCredential {
    /// Decrypt one of the secret fields under the session key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] with `CryptoError::Decryption` when
    /// the blob fails its integrity check (tampered bytes or a key that
    /// no longer matches) — the record is unreadable, not blank.
    pub fn reveal(&self, key: &MasterKey, field: FieldTag) -> Result<SecretBuffer, VaultError> {
        let blob = match field {
            FieldTag::Username => &self.username_ciphertext,
            FieldTag::Password => &self.password_ciphertext,
        };
        let sealed = SealedField::from_bytes(blob)?;
        Ok(cipher::decrypt(key, &sealed, field.aad())?)
    }
}

// ---------------------------------------------------------------------------
// Drafts and validation
// ---------------------------------------------------------------------------

/// Validated input for `create` and `update`.
///
/// Construction via [`CredentialDraft::new`] enforces the write-time
/// preconditions before any encryption or persistence happens.
pub struct CredentialDraft {
    pub(crate) title: String,
    pub(crate) identifier: String,
    pub(crate) username: String,
    pub(crate) password: String,
}

impl CredentialDraft {
    /// Validate caller input into a draft.
    ///
    /// `identifier` defaults to the derived slug when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] naming the first offending
    /// field: a title that trims to empty, or an empty username or
    /// password.
    pub fn new(
        title: &str,
        identifier: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<Self, VaultError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VaultError::Validation("title"));
        }
        if username.is_empty() {
            return Err(VaultError::Validation("username"));
        }
        if password.is_empty() {
            return Err(VaultError::Validation("password"));
        }
        let identifier = identifier.map_or_else(|| derive_identifier(title), str::to_string);
        Ok(Self {
            title: title.to_string(),
            identifier,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Seal both secret fields and assemble a record with the given id.
    pub(crate) fn seal(&self, id: String, key: &MasterKey) -> Result<AccountCredential, VaultError> {
        let username_ciphertext =
            cipher::encrypt(key, self.username.as_bytes(), FieldTag::Username.aad())?.to_bytes();
        let password_ciphertext =
            cipher::encrypt(key, self.password.as_bytes(), FieldTag::Password.aad())?.to_bytes();
        Ok(AccountCredential {
            id,
            title: self.title.clone(),
            identifier: self.identifier.clone(),
            username_ciphertext,
            password_ciphertext,
        })
    }
}

/// Derive the informational slug: lower-cased, whitespace-stripped title.
#[must_use]
pub fn derive_identifier(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Generate a UUID v4 string from the OS CSPRNG.
pub(crate) fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);

    // Version (4) and RFC 4122 variant bits.
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
