//! Bridge errors and the provider rejection taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::session::ConnectionState;
use crate::crypto::CryptoError;
use crate::ledger::LedgerError;
use crate::storage::StoreError;

/// Why a wallet said no. Every provider's error codes collapse into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    UserRejected,
    WalletRejected,
    NetworkRejected,
    InsufficientFunds,
    MalformedTransaction,
    Unknown,
}

impl RejectionKind {
    /// Stable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionKind::UserRejected => "user_rejected",
            RejectionKind::WalletRejected => "wallet_rejected",
            RejectionKind::NetworkRejected => "network_rejected",
            RejectionKind::InsufficientFunds => "insufficient_funds",
            RejectionKind::MalformedTransaction => "malformed_transaction",
            RejectionKind::Unknown => "unknown",
        }
    }

    /// Something a rider can read.
    pub fn user_message(&self) -> &'static str {
        match self {
            RejectionKind::UserRejected => "Transaction was rejected by user",
            RejectionKind::WalletRejected => "Transaction was rejected by wallet",
            RejectionKind::NetworkRejected => "Transaction was rejected by network",
            RejectionKind::InsufficientFunds => "Insufficient funds for transaction",
            RejectionKind::MalformedTransaction => "Invalid transaction",
            RejectionKind::Unknown => "Transaction signing failed",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("{callback} callback arrived while {state}; ignored")]
    UnexpectedCallback {
        callback: &'static str,
        state: ConnectionState,
    },

    #[error("callback URL does not belong to any wallet bridge")]
    UnroutableCallback,

    #[error("malformed wallet callback: {0}")]
    MalformedCallback(String),

    #[error("bridge channel error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("wallet rejected the request ({kind}): {message}")]
    Rejected {
        kind: RejectionKind,
        code: Option<String>,
        message: String,
    },

    #[error("wallet response has an unrecognized shape")]
    UnrecognizedResponse,

    #[error("signed transaction is invalid: {0}")]
    InvalidTransaction(String),

    #[error("broadcast failed: {0}")]
    Broadcast(#[source] LedgerError),

    #[error("deep link dispatch failed: {0}")]
    Dispatch(String),

    #[error("bridge store error: {0}")]
    Store(#[from] StoreError),
}

impl BridgeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidState { .. } => "invalid_state",
            BridgeError::UnexpectedCallback { .. } => "unexpected_callback",
            BridgeError::UnroutableCallback => "unroutable_callback",
            BridgeError::MalformedCallback(_) => "malformed_callback",
            BridgeError::Crypto(_) => "decryption_failed",
            BridgeError::Rejected { kind, .. } => kind.code(),
            BridgeError::UnrecognizedResponse => "unrecognized_response",
            BridgeError::InvalidTransaction(_) => "invalid_transaction",
            BridgeError::Broadcast(_) => "broadcast_failed",
            BridgeError::Dispatch(_) => "dispatch_failed",
            BridgeError::Store(_) => "store_error",
        }
    }

    pub(crate) fn rejected(kind: RejectionKind, code: Option<String>, message: Option<String>) -> Self {
        BridgeError::Rejected {
            kind,
            code,
            message: message.unwrap_or_else(|| kind.user_message().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(RejectionKind::InsufficientFunds.code(), "insufficient_funds");
        let err = BridgeError::rejected(RejectionKind::UserRejected, Some("4001".into()), None);
        assert_eq!(err.code(), "user_rejected");
        assert!(err.to_string().contains("Transaction was rejected by user"));
    }
}
