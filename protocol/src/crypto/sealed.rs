//! # The Bridge Channel
//!
//! Wallet apps encrypt their callbacks with NaCl's `box`: X25519 for the key
//! agreement, HSalsa20 to turn the raw shared point into a key, and
//! XSalsa20-Poly1305 to seal each message under a random 24-byte nonce.
//!
//! We split `box` the way libsodium does:
//!
//! - [`derive_shared_key`] is `box.before`: run once per connection.
//! - [`seal`] / [`open`] are `box.after` / `box.open.after`: run per message.
//!
//! The ciphertext layout is NaCl's (Poly1305 tag first, then the encrypted
//! bytes), which is exactly what `crypto_secretbox` produces. Anything else
//! and the wallet would reject us, loudly, in front of a rider.
//!
//! ## Weak keys
//!
//! A peer key that is a low-order point yields an all-zero shared secret.
//! [`derive_shared_key`] refuses those instead of happily deriving the one
//! key every attacker already knows.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use rand::RngCore;
use salsa20::cipher::consts::U10;
use salsa20::cipher::generic_array::GenericArray;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use x25519_dalek::PublicKey;

use super::encoding::{decode_base58, decode_base58_array, encode_base58};
use super::keys::{BridgeKeypair, EncryptionPublicKey};
use super::CryptoError;
use crate::config::{BOX_NONCE_LENGTH, X25519_KEY_LENGTH};

/// The 32-byte key both sides of a bridge channel derive.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; X25519_KEY_LENGTH]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; X25519_KEY_LENGTH] {
        self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey([REDACTED])")
    }
}

/// A sealed message in its deep-link form: both fields base58.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub nonce: String,
    pub data: String,
}

/// `box.before`: X25519 followed by HSalsa20 with a zero input block.
pub fn derive_shared_key(
    own: &BridgeKeypair,
    peer: &EncryptionPublicKey,
) -> Result<SharedKey, CryptoError> {
    let peer = PublicKey::from(*peer.as_bytes());
    let raw = own.secret().diffie_hellman(&peer);
    if !raw.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }

    let key = salsa20::hsalsa::<U10>(
        GenericArray::from_slice(raw.as_bytes()),
        &GenericArray::default(),
    );
    let mut out = [0u8; X25519_KEY_LENGTH];
    out.copy_from_slice(key.as_slice());
    Ok(SharedKey(out))
}

/// Seal `plaintext` under a fresh random nonce.
pub fn seal(key: &SharedKey, plaintext: &[u8]) -> Result<SealedPayload, CryptoError> {
    let mut nonce = [0u8; BOX_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher =
        XSalsa20Poly1305::new_from_slice(&key.0).map_err(|_| CryptoError::SealFailed)?;
    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    Ok(SealedPayload {
        nonce: encode_base58(&nonce),
        data: encode_base58(&ciphertext),
    })
}

/// Open a sealed payload. Fails on a wrong key, wrong nonce, or any tampering.
pub fn open(key: &SharedKey, nonce: &str, data: &str) -> Result<Vec<u8>, CryptoError> {
    let nonce = decode_base58_array::<BOX_NONCE_LENGTH>("nonce", nonce)?;
    let ciphertext = decode_base58("data", data)?;

    let cipher = XSalsa20Poly1305::new_from_slice(&key.0).map_err(|_| CryptoError::OpenFailed)?;
    cipher
        .decrypt(GenericArray::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| CryptoError::OpenFailed)
}

/// Serialize `value` to JSON and seal it.
pub fn seal_json<T: Serialize>(key: &SharedKey, value: &T) -> Result<SealedPayload, CryptoError> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
    seal(key, &bytes)
}

/// Open a payload and parse it as JSON.
pub fn open_json<T: DeserializeOwned>(
    key: &SharedKey,
    nonce: &str,
    data: &str,
) -> Result<T, CryptoError> {
    let bytes = open(key, nonce, data)?;
    serde_json::from_slice(&bytes).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_both_sides_derive_the_same_key() {
        let app = BridgeKeypair::generate();
        let wallet = BridgeKeypair::generate();

        let ours = derive_shared_key(&app, &wallet.public_key()).unwrap();
        let theirs = derive_shared_key(&wallet, &app.public_key()).unwrap();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_wallet_sealed_message_opens_on_our_side() {
        let app = BridgeKeypair::generate();
        let wallet = BridgeKeypair::generate();
        let wallet_side = derive_shared_key(&wallet, &app.public_key()).unwrap();
        let our_side = derive_shared_key(&app, &wallet.public_key()).unwrap();

        let sealed = seal_json(&wallet_side, &json!({ "public_key": "abc", "session": "s1" })).unwrap();
        let opened: serde_json::Value = open_json(&our_side, &sealed.nonce, &sealed.data).unwrap();
        assert_eq!(opened["session"], "s1");
    }

    #[test]
    fn test_third_party_key_cannot_open() {
        let app = BridgeKeypair::generate();
        let wallet = BridgeKeypair::generate();
        let eve = BridgeKeypair::generate();

        let key = derive_shared_key(&app, &wallet.public_key()).unwrap();
        let eves_key = derive_shared_key(&eve, &wallet.public_key()).unwrap();

        let sealed = seal(&key, b"hello").unwrap();
        assert_eq!(
            open(&eves_key, &sealed.nonce, &sealed.data),
            Err(CryptoError::OpenFailed)
        );
    }

    #[test]
    fn test_ciphertext_has_nacl_overhead() {
        let key = SharedKey::from_bytes([9u8; 32]);
        let sealed = seal(&key, b"12345").unwrap();
        let raw = decode_base58("data", &sealed.data).unwrap();
        assert_eq!(raw.len(), 5 + crate::config::BOX_TAG_LENGTH);
        assert_eq!(decode_base58("nonce", &sealed.nonce).unwrap().len(), BOX_NONCE_LENGTH);
    }

    #[test]
    fn test_low_order_peer_key_rejected() {
        let app = BridgeKeypair::generate();
        let zero = EncryptionPublicKey([0u8; 32]);
        assert_eq!(
            derive_shared_key(&app, &zero).unwrap_err(),
            CryptoError::WeakPublicKey
        );
    }

    #[test]
    fn test_non_json_plaintext_is_malformed() {
        let key = SharedKey::from_bytes([1u8; 32]);
        let sealed = seal(&key, b"not json").unwrap();
        let result: Result<serde_json::Value, _> = open_json(&key, &sealed.nonce, &sealed.data);
        assert!(matches!(result, Err(CryptoError::MalformedPayload(_))));
    }

    #[test]
    fn test_short_nonce_rejected_before_decrypting() {
        let key = SharedKey::from_bytes([1u8; 32]);
        let sealed = seal(&key, b"{}").unwrap();
        let short = encode_base58(&[0u8; 12]);
        assert!(matches!(
            open(&key, &short, &sealed.data),
            Err(CryptoError::InvalidLength { what: "nonce", .. })
        ));
    }
}
