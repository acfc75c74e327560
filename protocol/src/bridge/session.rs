//! # WalletBridgeSession
//!
//! One per wallet provider. Owns the bridge key pair, and once a wallet has
//! said yes, the shared key, the wallet's session token and the payer's
//! address.
//!
//! ## State machine
//!
//! ```text
//!                connect()               callback ok
//! disconnected ───────────▶ connecting ─────────────▶ connected
//!      ▲                        │                      │     ▲
//!      │      callback failed   │     sign_transaction │     │ any sign callback
//!      └────────────────────────┘                      ▼     │
//!      ▲                                             signing ┘
//!      │                 disconnect()                  │
//!      └───────────────────────────────────────────────┘
//! ```
//!
//! There is no timeout. A wallet that never calls back leaves the bridge in
//! `connecting` or `signing` until the caller gives up and disconnects; from
//! here, "still deciding" and "app closed" look identical.
//!
//! ## Invariant
//!
//! The shared key, session token and address live in one `Channel` value
//! that is either wholly present or absent. `connected` and `signing` imply
//! it's present. A half-finished handshake has nowhere to be stored.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::deeplink::DeepLinkDispatcher;
use super::error::{BridgeError, RejectionKind};
use super::provider::{CallbackKind, WalletProvider};
use super::response::{decode_sign_response, ConnectResponse, SignedPayload};
use crate::config::BridgeConfig;
use crate::crypto::{
    derive_shared_key, encode_base58, is_valid_address, open, open_json, seal_json, BridgeKeypair,
    EncryptionPublicKey, SharedKey,
};
use crate::ledger::{ConfirmationStatus, LedgerClient, ParsedTransaction};
use crate::storage::{BridgeRecord, BridgeStore};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Signing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Signing => "signing",
        })
    }
}

/// What observers see on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub provider: WalletProvider,
    pub state: ConnectionState,
    pub address: Option<String>,
}

/// Everything noteworthy a bridge does, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Connected {
        provider: WalletProvider,
        address: String,
    },
    ConnectFailed {
        provider: WalletProvider,
        code: String,
        reason: String,
    },
    TransactionSent {
        provider: WalletProvider,
        signature: String,
    },
    TransactionConfirmed {
        provider: WalletProvider,
        signature: String,
    },
    /// Sent, but confirmation didn't arrive in time. It may still land.
    TransactionUnconfirmed {
        provider: WalletProvider,
        signature: String,
    },
    TransactionFailed {
        provider: WalletProvider,
        signature: Option<String>,
        reason: String,
    },
    SignRejected {
        provider: WalletProvider,
        kind: RejectionKind,
        message: String,
    },
    Disconnected {
        provider: WalletProvider,
    },
}

/// Where an outbound link pointed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Wallet,
    /// The wallet isn't installed; this is its store page.
    InstallPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedLink {
    pub url: String,
    pub target: LinkTarget,
}

/// Who put the signed transaction on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmittedBy {
    Bridge,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOutcome {
    pub signature: String,
    pub submitted_by: SubmittedBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Connected { address: String },
    Signed(SignOutcome),
}

/// The plaintext of a sign request.
#[derive(Serialize)]
struct SignRequest<'a> {
    transaction: String,
    session: &'a str,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Channel {
    shared_key: SharedKey,
    session_token: String,
    address: String,
    connected_at: DateTime<Utc>,
}

struct BridgeState {
    keypair: BridgeKeypair,
    connection: ConnectionState,
    channel: Option<Channel>,
}

impl BridgeState {
    fn fresh(keypair: BridgeKeypair) -> Self {
        Self {
            keypair,
            connection: ConnectionState::Disconnected,
            channel: None,
        }
    }

    fn record(&self) -> BridgeRecord {
        let mut record = BridgeRecord::disconnected(self.keypair.secret_bytes());
        if let Some(channel) = &self.channel {
            record.shared_key = Some(channel.shared_key.to_bytes());
            record.session_token = Some(channel.session_token.clone());
            record.wallet_address = Some(channel.address.clone());
            record.connected_at = Some(channel.connected_at);
        }
        record
    }

    fn drop_channel(&mut self) {
        self.channel = None;
        self.connection = ConnectionState::Disconnected;
    }
}

struct BridgeInner {
    provider: WalletProvider,
    config: BridgeConfig,
    state: Mutex<BridgeState>,
    status: watch::Sender<BridgeStatus>,
    events: broadcast::Sender<BridgeEvent>,
    dispatcher: Arc<dyn DeepLinkDispatcher>,
    ledger: Arc<dyn LedgerClient>,
    store: Option<BridgeStore>,
}

// ---------------------------------------------------------------------------
// WalletBridgeSession
// ---------------------------------------------------------------------------

/// A wallet bridge for one provider. Clones share state.
#[derive(Clone)]
pub struct WalletBridgeSession {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for WalletBridgeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("WalletBridgeSession")
            .field("provider", &status.provider)
            .field("state", &status.state)
            .field("address", &status.address)
            .finish_non_exhaustive()
    }
}

impl WalletBridgeSession {
    /// Build a bridge, restoring from `store` when a usable record exists.
    ///
    /// A record that is inconsistent (some channel fields but not all, or an
    /// invalid address) is discarded and the bridge starts over with a fresh
    /// key pair.
    pub fn new(
        provider: WalletProvider,
        config: BridgeConfig,
        dispatcher: Arc<dyn DeepLinkDispatcher>,
        ledger: Arc<dyn LedgerClient>,
        store: Option<BridgeStore>,
    ) -> Result<Self, BridgeError> {
        let loaded = match &store {
            Some(store) => store.load(provider.slug())?,
            None => None,
        };

        let (state, needs_save) = match loaded {
            Some(record) => restore(provider, record),
            None => (BridgeState::fresh(BridgeKeypair::generate()), true),
        };

        if needs_save {
            if let Some(store) = &store {
                store.save(provider.slug(), &state.record())?;
            }
        }

        let status = BridgeStatus {
            provider,
            state: state.connection,
            address: state.channel.as_ref().map(|c| c.address.clone()),
        };
        info!(
            %provider,
            state = %status.state,
            public_key = %state.keypair.public_key(),
            "wallet bridge ready"
        );

        let (status_tx, _) = watch::channel(status);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(BridgeInner {
                provider,
                config,
                state: Mutex::new(state),
                status: status_tx,
                events,
                dispatcher,
                ledger,
                store,
            }),
        })
    }

    // -- Observers ----------------------------------------------------------

    pub fn provider(&self) -> WalletProvider {
        self.inner.provider
    }

    pub fn status(&self) -> BridgeStatus {
        self.inner.status.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    pub fn address(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .channel
            .as_ref()
            .map(|c| c.address.clone())
    }

    pub fn public_key(&self) -> EncryptionPublicKey {
        self.inner.state.lock().keypair.public_key()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BridgeStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Which of this bridge's callbacks `url` is, if any.
    pub fn classify(&self, url: &str) -> Option<CallbackKind> {
        self.inner.provider.classify_callback(&self.inner.config, url)
    }

    // -- connect ------------------------------------------------------------

    /// Send the wallet a connect request. The answer arrives later, as a
    /// callback link.
    pub async fn connect(&self) -> Result<DispatchedLink, BridgeError> {
        let url = {
            let state = self.inner.state.lock();
            match state.connection {
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
                other => {
                    return Err(BridgeError::InvalidState {
                        operation: "connect",
                        state: other,
                    })
                }
            }
            self.inner
                .provider
                .connect_url(&self.inner.config, &state.keypair.public_key().to_base58())
        };

        if !self.inner.dispatcher.can_open(&url).await {
            return self.open_install_page().await;
        }

        self.enter(
            &[ConnectionState::Disconnected, ConnectionState::Connecting],
            ConnectionState::Connecting,
            "connect",
        )?;
        if let Err(e) = self.inner.dispatcher.open(&url).await {
            self.revert(ConnectionState::Connecting, ConnectionState::Disconnected);
            return Err(BridgeError::Dispatch(e));
        }

        info!(provider = %self.inner.provider, "connect request dispatched");
        Ok(DispatchedLink {
            url,
            target: LinkTarget::Wallet,
        })
    }

    /// Finish the handshake from the wallet's connect callback.
    pub async fn handle_connect_callback(&self, url: &str) -> Result<String, BridgeError> {
        let params = callback_params(url);
        let keypair = {
            let state = self.inner.state.lock();
            if state.connection != ConnectionState::Connecting {
                return Err(BridgeError::UnexpectedCallback {
                    callback: "connect",
                    state: state.connection,
                });
            }
            state.keypair.clone()
        };

        match self.complete_handshake(&keypair, &params) {
            Ok(channel) => {
                let address = channel.address.clone();
                let record = {
                    let mut state = self.inner.state.lock();
                    if state.connection != ConnectionState::Connecting {
                        return Err(BridgeError::UnexpectedCallback {
                            callback: "connect",
                            state: state.connection,
                        });
                    }
                    state.channel = Some(channel);
                    state.connection = ConnectionState::Connected;
                    state.record()
                };
                self.persist(&record);
                self.publish_status();
                info!(provider = %self.inner.provider, %address, "wallet connected");
                self.emit(BridgeEvent::Connected {
                    provider: self.inner.provider,
                    address: address.clone(),
                });
                Ok(address)
            }
            Err(e) => {
                let record = {
                    let mut state = self.inner.state.lock();
                    state.drop_channel();
                    state.record()
                };
                self.persist(&record);
                self.publish_status();
                warn!(provider = %self.inner.provider, error = %e, "wallet connect failed");
                self.emit(BridgeEvent::ConnectFailed {
                    provider: self.inner.provider,
                    code: e.code().to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn complete_handshake(
        &self,
        keypair: &BridgeKeypair,
        params: &HashMap<String, String>,
    ) -> Result<Channel, BridgeError> {
        if let Some(err) = self.rejection(params) {
            return Err(err);
        }

        let profile = self.inner.provider.profile();
        let wallet_key = param(params, profile.wallet_key_param).ok_or_else(|| {
            BridgeError::MalformedCallback(format!("missing {}", profile.wallet_key_param))
        })?;
        let nonce = self.nonce(params)?;
        let data = param(params, "data")
            .ok_or_else(|| BridgeError::MalformedCallback("missing data".into()))?;

        let peer = EncryptionPublicKey::from_base58(wallet_key)?;
        let shared_key = derive_shared_key(keypair, &peer)?;
        let response: ConnectResponse = open_json(&shared_key, nonce, data)?;

        if !is_valid_address(&response.public_key) {
            return Err(BridgeError::MalformedCallback(
                "wallet address is not a valid ledger address".into(),
            ));
        }
        if response.session.is_empty() {
            return Err(BridgeError::MalformedCallback("empty session token".into()));
        }

        Ok(Channel {
            shared_key,
            session_token: response.session,
            address: response.public_key,
            connected_at: Utc::now(),
        })
    }

    // -- signTransaction ----------------------------------------------------

    /// Ask the wallet to sign `transaction` (serialized, signatures empty).
    pub async fn sign_transaction(&self, transaction: &[u8]) -> Result<DispatchedLink, BridgeError> {
        if transaction.is_empty() {
            return Err(BridgeError::InvalidTransaction("empty transaction".into()));
        }

        let url = {
            let state = self.inner.state.lock();
            let channel = match (&state.connection, &state.channel) {
                (ConnectionState::Connected, Some(channel)) => channel,
                (other, _) => {
                    return Err(BridgeError::InvalidState {
                        operation: "sign a transaction",
                        state: *other,
                    })
                }
            };
            let sealed = seal_json(
                &channel.shared_key,
                &SignRequest {
                    transaction: encode_base58(transaction),
                    session: &channel.session_token,
                },
            )?;
            self.inner.provider.sign_url(
                &self.inner.config,
                &state.keypair.public_key().to_base58(),
                &sealed.nonce,
                &sealed.data,
            )
        };

        if !self.inner.dispatcher.can_open(&url).await {
            return self.open_install_page().await;
        }

        self.enter(
            &[ConnectionState::Connected],
            ConnectionState::Signing,
            "sign a transaction",
        )?;
        if let Err(e) = self.inner.dispatcher.open(&url).await {
            self.revert(ConnectionState::Signing, ConnectionState::Connected);
            return Err(BridgeError::Dispatch(e));
        }

        info!(provider = %self.inner.provider, bytes = transaction.len(), "sign request dispatched");
        Ok(DispatchedLink {
            url,
            target: LinkTarget::Wallet,
        })
    }

    /// Handle the wallet's sign callback: decrypt, check, broadcast.
    ///
    /// Returns once the transaction is broadcast; confirmation is reported
    /// later on the event channel. The bridge is back in `connected` before
    /// this returns, whatever the outcome.
    pub async fn handle_sign_callback(&self, url: &str) -> Result<SignOutcome, BridgeError> {
        let params = callback_params(url);
        let (shared_key, address) = {
            let mut state = self.inner.state.lock();
            if state.connection != ConnectionState::Signing {
                return Err(BridgeError::UnexpectedCallback {
                    callback: "sign",
                    state: state.connection,
                });
            }
            let keys = state
                .channel
                .as_ref()
                .map(|c| (c.shared_key.clone(), c.address.clone()));
            let Some(keys) = keys else {
                state.drop_channel();
                return Err(BridgeError::InvalidState {
                    operation: "finish signing",
                    state: ConnectionState::Disconnected,
                });
            };
            state.connection = ConnectionState::Connected;
            keys
        };
        self.publish_status();

        let result = self.process_sign_response(&params, &shared_key, &address).await;
        match &result {
            Ok(outcome) => {
                info!(
                    provider = %self.inner.provider,
                    signature = %outcome.signature,
                    submitted_by = ?outcome.submitted_by,
                    "transaction sent"
                );
                self.emit(BridgeEvent::TransactionSent {
                    provider: self.inner.provider,
                    signature: outcome.signature.clone(),
                });
                let bridge = self.clone();
                let signature = outcome.signature.clone();
                tokio::spawn(async move { bridge.watch_confirmation(signature).await });
            }
            Err(BridgeError::Rejected { kind, message, .. }) => {
                info!(provider = %self.inner.provider, %kind, "wallet rejected signing");
                self.emit(BridgeEvent::SignRejected {
                    provider: self.inner.provider,
                    kind: *kind,
                    message: message.clone(),
                });
            }
            Err(e) => {
                warn!(provider = %self.inner.provider, error = %e, "signing failed");
                self.emit(BridgeEvent::TransactionFailed {
                    provider: self.inner.provider,
                    signature: None,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    async fn process_sign_response(
        &self,
        params: &HashMap<String, String>,
        shared_key: &SharedKey,
        address: &str,
    ) -> Result<SignOutcome, BridgeError> {
        if let Some(err) = self.rejection(params) {
            return Err(err);
        }

        let data = param(params, "data");
        let nonce = param(params, "nonce");
        let (data, nonce) = match (data, nonce) {
            (None, None) => {
                return Err(BridgeError::rejected(
                    RejectionKind::UserRejected,
                    None,
                    Some("Transaction was cancelled by user".into()),
                ))
            }
            (Some(data), Some(nonce)) => (data, nonce),
            (Some(data), None) if self.inner.provider.profile().nonce_optional => (data, ""),
            _ => {
                return Err(BridgeError::MalformedCallback(
                    "response carries only one of data and nonce".into(),
                ))
            }
        };

        let plaintext = open(shared_key, nonce, data)?;
        match decode_sign_response(self.inner.provider, &plaintext)? {
            SignedPayload::Signature(signature) => Ok(SignOutcome {
                signature,
                submitted_by: SubmittedBy::Wallet,
            }),
            SignedPayload::Transaction(bytes) => {
                let parsed = ParsedTransaction::parse(&bytes)
                    .map_err(|e| BridgeError::InvalidTransaction(e.to_string()))?;
                check_fee_payer(&parsed, address)?;
                let signature = self
                    .inner
                    .ledger
                    .broadcast(&bytes)
                    .await
                    .map_err(BridgeError::Broadcast)?;
                Ok(SignOutcome {
                    signature,
                    submitted_by: SubmittedBy::Bridge,
                })
            }
        }
    }

    async fn watch_confirmation(&self, signature: String) {
        let provider = self.inner.provider;
        let event = match self.inner.ledger.confirm(&signature).await {
            Ok(ConfirmationStatus::Confirmed) => {
                info!(%provider, %signature, "transaction confirmed");
                BridgeEvent::TransactionConfirmed {
                    provider,
                    signature,
                }
            }
            Ok(ConfirmationStatus::Failed(reason)) => {
                warn!(%provider, %signature, %reason, "transaction failed on ledger");
                BridgeEvent::TransactionFailed {
                    provider,
                    signature: Some(signature),
                    reason,
                }
            }
            Ok(ConfirmationStatus::Timeout) => {
                warn!(%provider, %signature, "transaction sent but confirmation timed out");
                BridgeEvent::TransactionUnconfirmed {
                    provider,
                    signature,
                }
            }
            Err(e) => {
                warn!(%provider, %signature, error = %e, "confirmation lookup failed");
                BridgeEvent::TransactionUnconfirmed {
                    provider,
                    signature,
                }
            }
        };
        self.emit(event);
    }

    // -- disconnect ---------------------------------------------------------

    /// Forget the wallet. The bridge key pair is kept, so reconnecting
    /// presents the same public key.
    pub fn disconnect(&self) {
        let (record, was) = {
            let mut state = self.inner.state.lock();
            let was = state.connection;
            state.drop_channel();
            (state.record(), was)
        };
        self.persist(&record);
        self.publish_status();
        if was != ConnectionState::Disconnected {
            info!(provider = %self.inner.provider, "wallet disconnected");
            self.emit(BridgeEvent::Disconnected {
                provider: self.inner.provider,
            });
        }
    }

    /// Route a classified callback to the right handler.
    pub async fn handle_callback(
        &self,
        kind: CallbackKind,
        url: &str,
    ) -> Result<CallbackOutcome, BridgeError> {
        match kind {
            CallbackKind::Connect => self
                .handle_connect_callback(url)
                .await
                .map(|address| CallbackOutcome::Connected { address }),
            CallbackKind::Sign => self.handle_sign_callback(url).await.map(CallbackOutcome::Signed),
        }
    }

    // -- Helpers ------------------------------------------------------------

    async fn open_install_page(&self) -> Result<DispatchedLink, BridgeError> {
        let url = self.inner.provider.profile().install_url.to_string();
        self.inner
            .dispatcher
            .open(&url)
            .await
            .map_err(BridgeError::Dispatch)?;
        info!(provider = %self.inner.provider, "wallet not installed, opened install page");
        Ok(DispatchedLink {
            url,
            target: LinkTarget::InstallPage,
        })
    }

    fn rejection(&self, params: &HashMap<String, String>) -> Option<BridgeError> {
        let code = param(params, "errorCode")?;
        let kind = self.inner.provider.rejection_kind(code);
        let message = match kind {
            RejectionKind::Unknown => param(params, "errorMessage").map(str::to_string),
            _ => None,
        };
        debug!(provider = %self.inner.provider, code, %kind, "wallet returned an error code");
        Some(BridgeError::rejected(kind, Some(code.to_string()), message))
    }

    fn nonce<'a>(&self, params: &'a HashMap<String, String>) -> Result<&'a str, BridgeError> {
        match param(params, "nonce") {
            Some(nonce) => Ok(nonce),
            None if self.inner.provider.profile().nonce_optional => Ok(""),
            None => Err(BridgeError::MalformedCallback("missing nonce".into())),
        }
    }

    fn enter(
        &self,
        from: &[ConnectionState],
        to: ConnectionState,
        operation: &'static str,
    ) -> Result<(), BridgeError> {
        {
            let mut state = self.inner.state.lock();
            if !from.contains(&state.connection) {
                return Err(BridgeError::InvalidState {
                    operation,
                    state: state.connection,
                });
            }
            state.connection = to;
        }
        self.publish_status();
        Ok(())
    }

    fn revert(&self, from: ConnectionState, to: ConnectionState) {
        {
            let mut state = self.inner.state.lock();
            if state.connection == from {
                state.connection = to;
            }
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        let status = {
            let state = self.inner.state.lock();
            BridgeStatus {
                provider: self.inner.provider,
                state: state.connection,
                address: state.channel.as_ref().map(|c| c.address.clone()),
            }
        };
        self.inner.status.send_replace(status);
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.inner.events.send(event);
    }

    fn persist(&self, record: &BridgeRecord) {
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.save(self.inner.provider.slug(), record) {
                warn!(provider = %self.inner.provider, error = %e, "failed to persist bridge state");
            }
        }
    }
}

/// Rebuild state from a stored record. Returns whether the result needs saving.
fn restore(provider: WalletProvider, record: BridgeRecord) -> (BridgeState, bool) {
    let keypair = BridgeKeypair::from_secret_bytes(record.secret_key);
    match (
        record.shared_key,
        record.session_token,
        record.wallet_address,
    ) {
        (None, None, None) => (BridgeState::fresh(keypair), false),
        (Some(key), Some(token), Some(address)) if is_valid_address(&address) && !token.is_empty() => {
            let state = BridgeState {
                keypair,
                connection: ConnectionState::Connected,
                channel: Some(Channel {
                    shared_key: SharedKey::from_bytes(key),
                    session_token: token,
                    address,
                    connected_at: record.connected_at.unwrap_or_else(Utc::now),
                }),
            };
            (state, false)
        }
        _ => {
            warn!(%provider, "stored bridge state is incomplete, starting fresh");
            (BridgeState::fresh(BridgeKeypair::generate()), true)
        }
    }
}

fn check_fee_payer(parsed: &ParsedTransaction, address: &str) -> Result<(), BridgeError> {
    let Some(payer) = parsed.fee_payer else {
        return Ok(());
    };
    if encode_base58(&payer) != address {
        return Err(BridgeError::InvalidTransaction(
            "fee payer is not the connected wallet".into(),
        ));
    }
    if parsed.fee_payer_signature_valid() == Some(false) {
        return Err(BridgeError::InvalidTransaction(
            "fee payer signature does not verify".into(),
        ));
    }
    Ok(())
}

fn callback_params(url: &str) -> HashMap<String, String> {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
