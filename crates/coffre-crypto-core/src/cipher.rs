//! AES-256-GCM authenticated encryption for credential fields.
//!
//! Each username/password field of a credential is sealed independently
//! under the master key. The caller supplies an AAD string that binds the
//! ciphertext to its field (so a username blob cannot be replayed in a
//! password slot), and every call draws a fresh 96-bit nonce from the OS
//! CSPRNG — two seals of identical plaintext never produce identical
//! ciphertext.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use crate::MasterKey;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum valid serialized length: nonce + empty ciphertext + tag.
const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// SealedField
// ---------------------------------------------------------------------------

/// One authenticated-encrypted credential field.
///
/// Wire format: `nonce (12) || ciphertext (variable) || tag (16)`. The
/// nonce travels with the ciphertext; the tag makes any modification of
/// nonce, ciphertext, or tag fail decryption.
#[must_use = "sealed fields must be persisted"]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedField {
    /// 96-bit random nonce, unique per seal.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted bytes (same length as the plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl SealedField {
    /// Serialize to the wire format `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = NONCE_LEN
            .saturating_add(self.ciphertext.len())
            .saturating_add(TAG_LEN);
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the wire format back into its parts.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` for inputs shorter than the
    /// 28-byte minimum (nonce + empty ciphertext + tag).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SEALED_LEN {
            return Err(CryptoError::Encryption(format!(
                "sealed field too short: {} bytes (minimum {MIN_SEALED_LEN})",
                bytes.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        // checked_sub cannot fail after the length guard; kept for the
        // workspace `arithmetic_side_effects = "deny"` lint.
        let ct_len = bytes
            .len()
            .checked_sub(MIN_SEALED_LEN)
            .ok_or_else(|| CryptoError::Encryption("sealed field length underflow".into()))?;
        let ct_end = NONCE_LEN.saturating_add(ct_len);
        let ciphertext = bytes[NONCE_LEN..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            nonce,
            ciphertext,
            tag,
        })
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

fn sealing_key(key: &MasterKey) -> Result<aead::LessSafeKey, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// Encrypt a field plaintext under the master key.
///
/// `aad` is authenticated but not encrypted; decryption must present the
/// same value. The plaintext may be empty.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the underlying seal fails.
pub fn encrypt(key: &MasterKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedField, CryptoError> {
    let sealer = sealing_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Seal in place — the copied plaintext becomes the ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) = sealer.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedField {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a sealed field.
///
/// Returns the plaintext in a [`SecretBuffer`] (zeroized on drop); the
/// intermediate open buffer is zeroized after copying. Fails closed: a
/// tag mismatch yields [`CryptoError::Decryption`] and no plaintext, so
/// tampered blobs and stale ciphertext from a deleted key are surfaced
/// rather than partially decrypted.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on wrong key, wrong AAD, or any
/// modification of the sealed bytes.
pub fn decrypt(key: &MasterKey, sealed: &SealedField, aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let opener = sealing_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    // open_in_place wants ciphertext || tag in one buffer.
    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let plaintext = opener
        .open_in_place(nonce, aead::Aad::from(aad), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext)?;
    ct_tag.zeroize();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
