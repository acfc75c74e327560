//! # Ledger Interface
//!
//! The engine and the bridge need exactly four things from a ledger:
//!
//! 1. "What landed at this address lately?" See [`LedgerClient::recent_incoming_transfers`]
//! 2. "What did that transaction actually do to balances?" See [`LedgerClient::transaction_detail`]
//! 3. "Send this signed transaction." See [`LedgerClient::broadcast`]
//! 4. "Did it stick?" See [`LedgerClient::confirm`]
//!
//! Anything beyond that is the ledger's business. Two implementations ship:
//! [`SolanaRpcClient`] for the real thing and [`MemoryLedger`] for tests and
//! demo mode.

pub mod memory;
pub mod rpc;
pub mod wire;

pub use memory::MemoryLedger;
pub use rpc::SolanaRpcClient;
pub use wire::{ParsedTransaction, WireError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Lamports;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ledger returned HTTP {0}")]
    Status(u16),

    #[error("ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),

    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),
}

/// One entry from an address's recent signature history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub signature: String,
    /// `None` when the ledger hasn't assigned a block time yet.
    pub block_time: Option<DateTime<Utc>>,
    pub failed: bool,
}

/// Pre/post balance of one account touched by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub address: String,
    pub pre: Lamports,
    pub post: Lamports,
}

/// What a confirmed transaction did to balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub signature: String,
    pub block_time: Option<DateTime<Utc>>,
    /// The ledger recorded an execution error.
    pub failed: bool,
    pub balance_changes: Vec<BalanceChange>,
}

impl TransactionDetail {
    /// Net amount credited to `address`, if the balance went up.
    ///
    /// Returns `None` when the address isn't in the transaction or its
    /// balance didn't increase. Debits are not "negative credits" here.
    pub fn credited_to(&self, address: &str) -> Option<Lamports> {
        self.balance_changes
            .iter()
            .find(|c| c.address == address)
            .filter(|c| c.post > c.pre)
            .map(|c| c.post - c.pre)
    }
}

/// Outcome of waiting for a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    /// The ledger executed it and it failed.
    Failed(String),
    /// Ran out of attempts. It may still land.
    Timeout,
}

/// The minimal ledger surface RidePay depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Most recent transactions touching `address`, newest first, at most `limit`.
    async fn recent_incoming_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransferSummary>, LedgerError>;

    /// Balance effects of one transaction, or `None` if the ledger doesn't know it.
    async fn transaction_detail(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, LedgerError>;

    /// Submit a fully signed transaction; returns its signature.
    async fn broadcast(&self, signed_transaction: &[u8]) -> Result<String, LedgerError>;

    /// Wait, boundedly, for `signature` to confirm.
    async fn confirm(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(pre: u64, post: u64) -> TransactionDetail {
        TransactionDetail {
            signature: "sig".into(),
            block_time: None,
            failed: false,
            balance_changes: vec![
                BalanceChange {
                    address: "payer".into(),
                    pre: Lamports(1_000_000_000),
                    post: Lamports(900_000_000),
                },
                BalanceChange {
                    address: "merchant".into(),
                    pre: Lamports(pre),
                    post: Lamports(post),
                },
            ],
        }
    }

    #[test]
    fn test_credited_amount_is_post_minus_pre() {
        assert_eq!(detail(10, 60).credited_to("merchant"), Some(Lamports(50)));
    }

    #[test]
    fn test_debit_is_not_a_credit() {
        assert_eq!(detail(60, 10).credited_to("merchant"), None);
        assert_eq!(detail(10, 60).credited_to("payer"), None);
    }

    #[test]
    fn test_unknown_address() {
        assert_eq!(detail(10, 60).credited_to("stranger"), None);
    }
}
