//! # At-Rest Encryption
//!
//! AES-256-GCM for bridge material sitting on disk: the bridge's X25519
//! secret, the shared key, the wallet's session token. None of it is
//! especially long-lived, but "it'll only be on disk for an hour" is how
//! most credential leaks start.
//!
//! ## Format
//!
//! [`encrypt`] returns `nonce || ciphertext || tag`. The nonce is 96 random
//! bits per record. Records are tiny and few, so the ~2^48 birthday bound on
//! random GCM nonces is not a concern this side of the heat death.
//!
//! Every call takes an `aad` (associated data) argument. The store passes
//! the record's key, so a ciphertext copied from the `phantom` slot into the
//! `backpack` slot fails authentication instead of quietly loading.
//!
//! ## Key derivation
//!
//! The storage key comes from an operator-supplied secret via BLAKE3's
//! `derive_key` mode with a fixed context string. Change the context and
//! every stored record becomes unreadable, which is occasionally what you
//! want and usually not.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// BLAKE3 context for the storage key. Never change this in place.
const STORAGE_KEY_CONTEXT: &str = "ridepay 2026-01 bridge store encryption key";

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong slot, or corrupted record")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Derive the 32-byte storage key from an operator secret.
pub fn derive_storage_key(secret: &[u8]) -> [u8; AES_KEY_LENGTH] {
    blake3::derive_key(STORAGE_KEY_CONTEXT, secret)
}

/// Encrypt `plaintext`, binding it to `aad`. Output is `nonce || ciphertext`.
pub fn encrypt(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse of [`encrypt`]. The `aad` must match exactly.
pub fn decrypt(
    key: &[u8; AES_KEY_LENGTH],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        derive_storage_key(b"test operator secret")
    }

    #[test]
    fn test_record_survives_the_trip() {
        let sealed = encrypt(&key(), b"session token", b"phantom").unwrap();
        assert_eq!(decrypt(&key(), &sealed, b"phantom").unwrap(), b"session token");
    }

    #[test]
    fn test_record_moved_to_another_slot_fails() {
        let sealed = encrypt(&key(), b"session token", b"phantom").unwrap();
        assert!(decrypt(&key(), &sealed, b"backpack").is_err());
    }

    #[test]
    fn test_tampered_record_fails() {
        let mut sealed = encrypt(&key(), b"session token", b"phantom").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&key(), &sealed, b"phantom").is_err());
    }

    #[test]
    fn test_different_secret_different_key() {
        assert_ne!(derive_storage_key(b"a"), derive_storage_key(b"b"));
        assert_eq!(derive_storage_key(b"a"), derive_storage_key(b"a"));
    }

    #[test]
    fn test_truncated_record() {
        assert!(matches!(
            decrypt(&key(), &[0u8; 5], b"phantom"),
            Err(EncryptionError::CiphertextTooShort)
        ));
    }
}
