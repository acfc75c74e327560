//! # Bridge Key Pairs
//!
//! Every wallet bridge owns one X25519 key pair. The public half rides along
//! in the connect link as `dapp_encryption_public_key` (or whatever the
//! provider calls it this year); the secret half never leaves the process
//! except encrypted, via the bridge store.
//!
//! ## Why X25519 and not Ed25519?
//!
//! Because this key does key agreement, not signing. Wallets expect a raw
//! Curve25519 Montgomery point, and handing them an Ed25519 key would be
//! like handing someone a house key and asking them to start the car.
//!
//! ## Serialization
//!
//! [`BridgeKeypair`] does not implement `Serialize`. If you want the secret
//! bytes you have to call [`BridgeKeypair::secret_bytes`] and mean it.

use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};

use super::encoding::{decode_base58_array, encode_base58};
use super::CryptoError;
use crate::config::X25519_KEY_LENGTH;

/// The bridge's key agreement pair.
#[derive(Clone)]
pub struct BridgeKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl BridgeKeypair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw secret scalar. Handle with the usual amount of paranoia.
    pub fn secret_bytes(&self) -> [u8; X25519_KEY_LENGTH] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey(self.public.to_bytes())
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for BridgeKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeKeypair")
            .field("public", &self.public_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A Curve25519 public key as it travels through deep links.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey(pub [u8; X25519_KEY_LENGTH]);

impl EncryptionPublicKey {
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        encode_base58(&self.0)
    }

    pub fn from_base58(value: &str) -> Result<Self, CryptoError> {
        decode_base58_array("encryption public key", value).map(Self)
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", self.to_base58())
    }
}

impl FromStr for EncryptionPublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for EncryptionPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for EncryptionPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}
