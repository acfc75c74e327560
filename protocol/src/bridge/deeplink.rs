//! # Deep Links
//!
//! Outbound: a [`DeepLinkDispatcher`] asks the platform whether a URL can be
//! opened and opens it. On a phone that's the OS; in the node it's an outbox
//! the HTTP layer hands back to the client.
//!
//! Inbound: the [`DeepLinkRouter`] takes every URL the app receives and
//! hands it to the one bridge whose redirect link it matches. No global
//! listeners, no closures capturing half the app. One channel in, one owner
//! per callback.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::provider::WalletProvider;
use super::session::{CallbackOutcome, WalletBridgeSession};

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Opens URLs on behalf of a bridge.
#[async_trait]
pub trait DeepLinkDispatcher: Send + Sync {
    /// Whether an app is installed that handles `url`.
    async fn can_open(&self, url: &str) -> bool;

    async fn open(&self, url: &str) -> Result<(), String>;
}

/// Records every opened URL instead of opening it.
///
/// Tests use it to inspect what would have been sent to the wallet; the node
/// uses it as the outbox it returns to API clients.
#[derive(Debug)]
pub struct RecordingDispatcher {
    installed: Mutex<bool>,
    opened: Mutex<Vec<String>>,
}

impl Default for RecordingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDispatcher {
    /// Pretends every wallet is installed.
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(true),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Pretends no wallet is installed, so bridges fall back to install links.
    pub fn without_wallets() -> Self {
        let dispatcher = Self::new();
        *dispatcher.installed.lock() = false;
        dispatcher
    }

    pub fn set_installed(&self, installed: bool) {
        *self.installed.lock() = installed;
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn last_opened(&self) -> Option<String> {
        self.opened.lock().last().cloned()
    }
}

#[async_trait]
impl DeepLinkDispatcher for RecordingDispatcher {
    async fn can_open(&self, _url: &str) -> bool {
        *self.installed.lock()
    }

    async fn open(&self, url: &str) -> Result<(), String> {
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A callback that reached its bridge.
#[derive(Debug)]
pub struct RoutedCallback {
    pub provider: WalletProvider,
    pub outcome: Result<CallbackOutcome, BridgeError>,
}

/// Fans inbound callback URLs out to the bridge that owns them.
#[derive(Debug, Clone, Default)]
pub struct DeepLinkRouter {
    bridges: Vec<WalletBridgeSession>,
}

impl DeepLinkRouter {
    pub fn new(bridges: Vec<WalletBridgeSession>) -> Self {
        Self { bridges }
    }

    pub fn bridges(&self) -> &[WalletBridgeSession] {
        &self.bridges
    }

    pub fn bridge(&self, provider: WalletProvider) -> Option<&WalletBridgeSession> {
        self.bridges.iter().find(|b| b.provider() == provider)
    }

    /// Deliver `url` to its bridge. Unknown URLs are an error, not a panic.
    pub async fn route(&self, url: &str) -> Result<RoutedCallback, BridgeError> {
        for bridge in &self.bridges {
            if let Some(kind) = bridge.classify(url) {
                debug!(provider = %bridge.provider(), ?kind, "routing wallet callback");
                let outcome = bridge.handle_callback(kind, url).await;
                return Ok(RoutedCallback {
                    provider: bridge.provider(),
                    outcome,
                });
            }
        }
        Err(BridgeError::UnroutableCallback)
    }

    /// Drain `inbound` until it closes or `shutdown` flips to `true`.
    pub async fn run(&self, mut inbound: mpsc::Receiver<String>, mut shutdown: watch::Receiver<bool>) {
        info!(bridges = self.bridges.len(), "deep link router started");
        loop {
            tokio::select! {
                maybe_url = inbound.recv() => {
                    let Some(url) = maybe_url else { break };
                    match self.route(&url).await {
                        Ok(RoutedCallback { provider, outcome: Err(e) }) => {
                            warn!(%provider, error = %e, "wallet callback failed");
                        }
                        Ok(RoutedCallback { provider, outcome: Ok(outcome) }) => {
                            debug!(%provider, ?outcome, "wallet callback handled");
                        }
                        Err(e) => debug!(error = %e, "ignoring inbound link"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("deep link router stopped");
    }
}
