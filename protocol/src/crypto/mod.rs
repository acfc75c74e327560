//! # Cryptographic Primitives for RidePay
//!
//! Everything security-related in the wallet bridge flows through here:
//!
//! - **X25519** for the ephemeral bridge key pair, which is what wallets expect.
//! - **HSalsa20 + XSalsa20-Poly1305** for the bridge channel. This is NaCl's
//!   `box`, split into its `before` (derive once) and `after` (seal/open
//!   many) halves, because that's the wire format wallet apps speak.
//! - **AES-256-GCM** for bridge material at rest.
//! - **Ed25519** verification for signed ledger transactions.
//! - **Base58** for everything that has to survive a URL query string.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Everything here is a thin, type-safe wrapper around audited
//! implementations. The only "construction" we do is gluing X25519 to
//! HSalsa20, and that's exactly what libsodium does too.

pub mod encoding;
pub mod encryption;
pub mod keys;
pub mod sealed;
pub mod signatures;

use thiserror::Error;

pub use encoding::{decode_base58, decode_base58_array, encode_base58, is_valid_address};
pub use encryption::{decrypt, derive_storage_key, encrypt, EncryptionError};
pub use keys::{BridgeKeypair, EncryptionPublicKey};
pub use sealed::{derive_shared_key, open, open_json, seal, seal_json, SealedPayload, SharedKey};
pub use signatures::verify_ledger_signature;

/// Errors from the bridge-facing crypto layer.
///
/// Deliberately coarse on the decryption side: "wrong key" and "tampered
/// ciphertext" look identical from the outside, and that's the point.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("{what} is not valid base58")]
    InvalidBase58 { what: &'static str },

    #[error("{what} must be {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("peer public key is a low-order point")]
    WeakPublicKey,

    #[error("sealing failed")]
    SealFailed,

    #[error("decryption failed -- wrong key, wrong nonce, or corrupted payload")]
    OpenFailed,

    #[error("decrypted payload is not the expected JSON: {0}")]
    MalformedPayload(String),
}
