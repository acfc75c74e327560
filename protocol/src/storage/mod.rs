//! # Storage
//!
//! The only thing RidePay persists locally is wallet bridge material: the
//! bridge's X25519 secret and, while connected, the shared key, session
//! token and wallet address. Payment sessions deliberately live in memory
//! (a restart forfeits them, and the ledger is the record that matters).
//!
//! Records sit in a sled tree, bincode-encoded and sealed with AES-256-GCM
//! under a key derived from an operator secret. See [`store`].

pub mod store;

pub use store::{BridgeRecord, BridgeStore, StoreError};
