//! # BridgeStore
//!
//! Encrypted persistence for wallet bridge sessions, on top of sled.
//!
//! ## Tree Layout
//!
//! | Tree      | Key                        | Value                                   |
//! |-----------|----------------------------|-----------------------------------------|
//! | `bridges` | provider slug (UTF-8)      | `aes_gcm(bincode(BridgeRecord), aad=key)` |
//!
//! The record key doubles as the AEAD associated data, so a record can't be
//! replayed into another provider's slot.
//!
//! ## Corruption
//!
//! A record that fails to decrypt or decode is logged, removed, and reported
//! as absent. The bridge then starts disconnected with a fresh key pair,
//! which is exactly what the user would get after reinstalling anyway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::{AES_KEY_LENGTH, X25519_KEY_LENGTH};
use crate::crypto::{decrypt, encrypt, EncryptionError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record encryption failed: {0}")]
    Encryption(#[from] EncryptionError),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Everything a bridge needs to come back after a restart.
///
/// The channel fields are all-or-nothing: a record with a session token but
/// no shared key is treated as disconnected by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub secret_key: [u8; X25519_KEY_LENGTH],
    pub shared_key: Option<[u8; X25519_KEY_LENGTH]>,
    pub session_token: Option<String>,
    pub wallet_address: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl BridgeRecord {
    /// A record holding only the key pair.
    pub fn disconnected(secret_key: [u8; X25519_KEY_LENGTH]) -> Self {
        Self {
            secret_key,
            shared_key: None,
            session_token: None,
            wallet_address: None,
            connected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared_key.is_some() && self.session_token.is_some() && self.wallet_address.is_some()
    }
}

// ---------------------------------------------------------------------------
// BridgeStore
// ---------------------------------------------------------------------------

/// Encrypted key-value store for bridge records. Cheap to clone.
#[derive(Clone)]
pub struct BridgeStore {
    db: Db,
    bridges: Tree,
    key: [u8; AES_KEY_LENGTH],
}

impl std::fmt::Debug for BridgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeStore")
            .field("records", &self.bridges.len())
            .finish_non_exhaustive()
    }
}

impl BridgeStore {
    /// Open or create a store at `path`, sealing records under `key`.
    pub fn open<P: AsRef<Path>>(path: P, key: [u8; AES_KEY_LENGTH]) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, key)
    }

    /// An in-memory store that disappears on drop. For tests and `--ephemeral`.
    pub fn open_temporary(key: [u8; AES_KEY_LENGTH]) -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, key)
    }

    fn from_db(db: Db, key: [u8; AES_KEY_LENGTH]) -> StoreResult<Self> {
        let bridges = db.open_tree("bridges")?;
        Ok(Self { db, bridges, key })
    }

    /// Load the record stored under `slot`, if any.
    pub fn load(&self, slot: &str) -> StoreResult<Option<BridgeRecord>> {
        let Some(sealed) = self.bridges.get(slot.as_bytes())? else {
            return Ok(None);
        };

        let decoded = decrypt(&self.key, &sealed, slot.as_bytes())
            .map_err(StoreError::from)
            .and_then(|plain| {
                bincode::deserialize::<BridgeRecord>(&plain)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            });

        match decoded {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(slot, error = %e, "discarding unreadable bridge record");
                self.bridges.remove(slot.as_bytes())?;
                Ok(None)
            }
        }
    }

    /// Replace the record under `slot` and flush.
    pub fn save(&self, slot: &str, record: &BridgeRecord) -> StoreResult<()> {
        let plain =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let sealed = encrypt(&self.key, &plain, slot.as_bytes())?;
        self.bridges.insert(slot.as_bytes(), sealed)?;
        self.db.flush()?;
        debug!(slot, connected = record.is_connected(), "bridge record saved");
        Ok(())
    }

    /// Remove the record under `slot`. Missing records are fine.
    pub fn clear(&self, slot: &str) -> StoreResult<()> {
        self.bridges.remove(slot.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_storage_key;

    fn store() -> BridgeStore {
        BridgeStore::open_temporary(derive_storage_key(b"test")).unwrap()
    }

    fn connected_record() -> BridgeRecord {
        BridgeRecord {
            secret_key: [3u8; 32],
            shared_key: Some([4u8; 32]),
            session_token: Some("session-1".into()),
            wallet_address: Some("7fDgaeRcsY8jdrECFc5qAJkwpuY8qqGbx2RYiVKomyMh".into()),
            connected_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_save_then_load() {
        let s = store();
        let record = connected_record();
        s.save("phantom", &record).unwrap();
        assert_eq!(s.load("phantom").unwrap(), Some(record));
        assert_eq!(s.load("solflare").unwrap(), None);
    }

    #[test]
    fn test_clear_removes_record() {
        let s = store();
        s.save("phantom", &connected_record()).unwrap();
        s.clear("phantom").unwrap();
        assert!(s.load("phantom").unwrap().is_none());
        // Clearing twice is a no-op.
        s.clear("phantom").unwrap();
    }

    #[test]
    fn test_record_under_wrong_key_is_discarded() {
        let old = store();
        old.save("phantom", &connected_record()).unwrap();

        // Same database, rotated operator secret.
        let rotated = BridgeStore::from_db(old.db.clone(), derive_storage_key(b"new")).unwrap();
        assert!(rotated.load("phantom").unwrap().is_none());
        // And it's gone for good, not just unreadable.
        assert!(old.bridges.get("phantom").unwrap().is_none());
    }

    #[test]
    fn test_disconnected_record_flags() {
        assert!(!BridgeRecord::disconnected([1u8; 32]).is_connected());
        assert!(connected_record().is_connected());
    }
}
