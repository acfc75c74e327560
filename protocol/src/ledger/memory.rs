//! In-process ledger.
//!
//! Good enough to drive the engine end to end without a network: post a
//! transfer, watch the session complete. Also lets tests script the unhappy
//! paths (rejected broadcasts, failed or stuck confirmations).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::{HashMap, VecDeque};

use super::wire::ParsedTransaction;
use super::{
    BalanceChange, ConfirmationStatus, LedgerClient, LedgerError, TransactionDetail,
    TransferSummary,
};
use crate::amount::Lamports;
use crate::config::LEDGER_SIGNATURE_LENGTH;
use crate::crypto::encode_base58;

#[derive(Debug, Default)]
struct State {
    /// Oldest first.
    transactions: Vec<TransactionDetail>,
    broadcasts: Vec<Vec<u8>>,
    broadcast_failures: VecDeque<String>,
    confirmations: HashMap<String, ConfirmationStatus>,
    default_confirmation: Option<ConfirmationStatus>,
    unavailable: bool,
}

/// A ledger that lives in a `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
}

fn random_signature() -> String {
    let mut bytes = [0u8; LEDGER_SIGNATURE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    encode_base58(&bytes)
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transfer of `amount` from `from` to `to` at `at`.
    /// Returns the transaction signature.
    pub fn post_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Lamports,
        at: DateTime<Utc>,
    ) -> String {
        self.post(from, to, amount, at, false)
    }

    /// Like [`post_transfer`](Self::post_transfer), but the ledger marks it failed.
    pub fn post_failed_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Lamports,
        at: DateTime<Utc>,
    ) -> String {
        self.post(from, to, amount, at, true)
    }

    fn post(&self, from: &str, to: &str, amount: Lamports, at: DateTime<Utc>, failed: bool) -> String {
        let signature = random_signature();
        let mut state = self.state.write();

        // Running balance of the recipient so pre/post look realistic.
        let to_balance = state
            .transactions
            .iter()
            .rev()
            .find_map(|t| t.balance_changes.iter().find(|c| c.address == to))
            .map(|c| c.post)
            .unwrap_or(Lamports::ZERO);
        let credited = if failed { Lamports::ZERO } else { amount };

        state.transactions.push(TransactionDetail {
            signature: signature.clone(),
            block_time: Some(at),
            failed,
            balance_changes: vec![
                BalanceChange {
                    address: from.to_string(),
                    pre: Lamports(u64::MAX / 2),
                    post: Lamports(u64::MAX / 2) - credited,
                },
                BalanceChange {
                    address: to.to_string(),
                    pre: to_balance,
                    post: to_balance + credited,
                },
            ],
        });
        signature
    }

    /// The next broadcast fails with `reason`. Stacks.
    pub fn fail_next_broadcast(&self, reason: impl Into<String>) {
        self.state.write().broadcast_failures.push_back(reason.into());
    }

    /// Script the confirmation outcome for one signature.
    pub fn set_confirmation(&self, signature: &str, status: ConfirmationStatus) {
        self.state
            .write()
            .confirmations
            .insert(signature.to_string(), status);
    }

    /// Outcome for signatures without a scripted one. Default: `Confirmed`.
    pub fn set_default_confirmation(&self, status: ConfirmationStatus) {
        self.state.write().default_confirmation = Some(status);
    }

    /// While set, every read fails as if the RPC node were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    /// Raw bytes of every successful broadcast, in order.
    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.state.read().broadcasts.clone()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.state.read().unavailable {
            return Err(LedgerError::Status(503));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn recent_incoming_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransferSummary>, LedgerError> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.balance_changes.iter().any(|c| c.address == address))
            .take(limit)
            .map(|t| TransferSummary {
                signature: t.signature.clone(),
                block_time: t.block_time,
                failed: t.failed,
            })
            .collect())
    }

    async fn transaction_detail(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, LedgerError> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .transactions
            .iter()
            .find(|t| t.signature == signature)
            .cloned())
    }

    async fn broadcast(&self, signed_transaction: &[u8]) -> Result<String, LedgerError> {
        let mut state = self.state.write();
        if let Some(reason) = state.broadcast_failures.pop_front() {
            return Err(LedgerError::BroadcastRejected(reason));
        }
        let signature = ParsedTransaction::parse(signed_transaction)
            .map(|tx| tx.id())
            .map_err(|e| LedgerError::BroadcastRejected(e.to_string()))?;
        state.broadcasts.push(signed_transaction.to_vec());
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError> {
        let state = self.state.read();
        Ok(state
            .confirmations
            .get(signature)
            .or(state.default_confirmation.as_ref())
            .cloned()
            .unwrap_or(ConfirmationStatus::Confirmed))
    }
}
