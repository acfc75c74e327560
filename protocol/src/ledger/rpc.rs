//! # Solana JSON-RPC Client
//!
//! A deliberately small JSON-RPC client: four methods, one HTTP client, one
//! request timeout. No websocket subscriptions, no retries on reads. The
//! engine polls anyway, so a failed read just means "try again next tick".
//!
//! | Trait method                 | RPC method                |
//! |------------------------------|---------------------------|
//! | `recent_incoming_transfers`  | `getSignaturesForAddress` |
//! | `transaction_detail`         | `getTransaction`          |
//! | `broadcast`                  | `sendTransaction`         |
//! | `confirm`                    | `getSignatureStatuses`    |

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    BalanceChange, ConfirmationStatus, LedgerClient, LedgerError, TransactionDetail,
    TransferSummary,
};
use crate::amount::Lamports;
use crate::config::{LedgerConfig, BROADCAST_MAX_RETRIES};
use crate::crypto::encode_base58;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    block_time: Option<i64>,
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    block_time: Option<i64>,
    meta: Option<RpcMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    #[serde(default)]
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcTransactionBody {
    signatures: Vec<String>,
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusesResult {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Talks JSON-RPC to a Solana cluster.
#[derive(Debug)]
pub struct SolanaRpcClient {
    client: Client,
    endpoint: String,
    confirm_attempts: u32,
    confirm_delay: Duration,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(),
            confirm_attempts: config.confirm_attempts.max(1),
            confirm_delay: Duration::from_millis(config.confirm_delay_ms),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(LedgerError::Status(response.status().as_u16()));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result)
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, LedgerError> {
        let statuses: Option<StatusesResult> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses.and_then(|s| s.value.into_iter().next().flatten()))
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    async fn recent_incoming_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransferSummary>, LedgerError> {
        let infos: Vec<SignatureInfo> = self
            .call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit, "commitment": "confirmed" }]),
            )
            .await?
            .unwrap_or_default();

        Ok(infos
            .into_iter()
            .map(|info| TransferSummary {
                signature: info.signature,
                block_time: info.block_time.and_then(unix_to_utc),
                failed: info.err.is_some(),
            })
            .collect())
    }

    async fn transaction_detail(
        &self,
        signature: &str,
    ) -> Result<Option<TransactionDetail>, LedgerError> {
        let tx: Option<RpcTransaction> = self
            .call(
                "getTransaction",
                json!([signature, {
                    "encoding": "json",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        let Some(tx) = tx else {
            return Ok(None);
        };
        let Some(meta) = tx.meta else {
            // No metadata, no balances. Nothing to match against.
            return Ok(None);
        };

        // v0 transactions append lookup-table addresses after the static keys.
        let loaded = meta.loaded_addresses.unwrap_or_default();
        let accounts = tx
            .transaction
            .message
            .account_keys
            .into_iter()
            .chain(loaded.writable)
            .chain(loaded.readonly);

        let balance_changes = accounts
            .enumerate()
            .map(|(i, address)| BalanceChange {
                address,
                pre: Lamports(meta.pre_balances.get(i).copied().unwrap_or(0)),
                post: Lamports(meta.post_balances.get(i).copied().unwrap_or(0)),
            })
            .collect();

        Ok(Some(TransactionDetail {
            signature: tx
                .transaction
                .signatures
                .into_iter()
                .next()
                .unwrap_or_else(|| signature.to_string()),
            block_time: tx.block_time.and_then(unix_to_utc),
            failed: meta.err.is_some(),
            balance_changes,
        }))
    }

    async fn broadcast(&self, signed_transaction: &[u8]) -> Result<String, LedgerError> {
        let encoded = encode_base58(signed_transaction);
        let result: Option<String> = self
            .call(
                "sendTransaction",
                json!([encoded, {
                    "encoding": "base58",
                    "preflightCommitment": "confirmed",
                    "maxRetries": BROADCAST_MAX_RETRIES,
                }]),
            )
            .await
            .map_err(|e| match e {
                LedgerError::Rpc { message, .. } => LedgerError::BroadcastRejected(message),
                other => other,
            })?;

        let signature = result
            .ok_or_else(|| LedgerError::InvalidResponse("sendTransaction: empty result".into()))?;
        debug!(%signature, "transaction broadcast");
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<ConfirmationStatus, LedgerError> {
        for attempt in 1..=self.confirm_attempts {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Ok(ConfirmationStatus::Failed(err.to_string()));
                    }
                    if matches!(
                        status.confirmation_status.as_deref(),
                        Some("confirmed") | Some("finalized")
                    ) {
                        return Ok(ConfirmationStatus::Confirmed);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%signature, attempt, error = %e, "signature status lookup failed");
                }
            }
            tokio::time::sleep(self.confirm_delay).await;
        }
        Ok(ConfirmationStatus::Timeout)
    }
}
