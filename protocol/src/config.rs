//! # Configuration & Constants
//!
//! Every magic number in RidePay lives here, next to the config structs that
//! let an operator override them. If you're hardcoding a tolerance somewhere
//! else, you're doing it wrong and you owe the team coffee.
//!
//! The structs all derive `Deserialize` with `#[serde(default)]`, so a
//! partial config (or none at all) still yields something that works on
//! devnet.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger Units
// ---------------------------------------------------------------------------

/// Lamports per SOL. The ledger never deals in fractions; neither do we.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Human-readable name of the ledger-native unit.
pub const LEDGER_UNIT_SYMBOL: &str = "SOL";

// ---------------------------------------------------------------------------
// Payment Sessions
// ---------------------------------------------------------------------------

/// How long a payer has to send funds once a session opens. Five minutes.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Session timeout used when `reduced_timeout` is switched on for testing.
pub const REDUCED_SESSION_TIMEOUT_SECS: u64 = 60;

/// Interval between ledger polls for each pending session. Independent of
/// however often the UI decides to refresh.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Number of recent signatures to pull for the receiving address per poll.
pub const TRANSACTION_SEARCH_LIMIT: usize = 50;

/// Absolute amount tolerance: 0.001 SOL. Not a percentage, on purpose.
pub const AMOUNT_TOLERANCE_LAMPORTS: u64 = 1_000_000;

/// Default receiving address (devnet test wallet).
pub const DEFAULT_RECEIVING_ADDRESS: &str = "7fDgaeRcsY8jdrECFc5qAJkwpuY8qqGbx2RYiVKomyMh";

/// Age after which a simulated session auto-completes.
pub const SIMULATED_COMPLETION_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Fiat-per-SOL rate used when the price oracle is unreachable.
pub const FALLBACK_EXCHANGE_RATE: f64 = 10_000.0;

/// Default fiat currency code, as the price API spells it.
pub const DEFAULT_FIAT_CURRENCY: &str = "inr";

/// Price API identifier of the ledger asset.
pub const DEFAULT_LEDGER_ASSET_ID: &str = "solana";

/// Base URL of the public price API.
pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com";

/// Price fetch timeout. One shot, no retries; past this we use the fallback.
pub const PRICE_FETCH_TIMEOUT_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Ledger RPC
// ---------------------------------------------------------------------------

/// Per-request timeout for ledger RPC calls.
pub const LEDGER_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Maximum status checks while waiting for a broadcast to confirm.
pub const CONFIRMATION_ATTEMPTS: u32 = 30;

/// Delay between confirmation status checks.
pub const CONFIRMATION_DELAY_MS: u64 = 1_000;

/// How many times the RPC node itself should retry a `sendTransaction`.
pub const BROADCAST_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// X25519 public and secret keys are both 32 bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// NaCl box nonces are 24 bytes. Random per message, never reused.
pub const BOX_NONCE_LENGTH: usize = 24;

/// Poly1305 tag length prepended to every box ciphertext.
pub const BOX_TAG_LENGTH: usize = 16;

/// AES-256-GCM key length in bytes (bridge store at rest).
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// Ed25519 signatures on the ledger are 64 bytes.
pub const LEDGER_SIGNATURE_LENGTH: usize = 64;

/// Ledger addresses are 32-byte Ed25519 public keys.
pub const LEDGER_ADDRESS_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Wallet Bridge
// ---------------------------------------------------------------------------

/// App URL shown to the wallet during the connect prompt.
pub const DEFAULT_APP_URL: &str = "https://gocabs.com";

/// URL scheme wallets redirect back to.
pub const DEFAULT_REDIRECT_SCHEME: &str = "gocabs";

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

/// Which ledger cluster we're talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Cluster {
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
    #[default]
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "testnet")]
    Testnet,
}

impl Cluster {
    /// The identifier wallets and RPC nodes expect.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "mainnet-beta",
            Cluster::Devnet => "devnet",
            Cluster::Testnet => "testnet",
        }
    }

    /// Public RPC endpoint for the cluster.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Payment Engine
// ---------------------------------------------------------------------------

/// How the engine decides a session has been paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VerificationMode {
    /// Match real transfers on the ledger. The only mode production uses.
    #[default]
    Ledger,
    /// Test/demo only: auto-complete any pending session older than
    /// `complete_after_secs`. Never selected implicitly.
    Simulated { complete_after_secs: u64 },
}

/// Tunables for the payment session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Ledger address payers send funds to.
    pub receiving_address: String,
    /// Normal session lifetime in seconds.
    pub session_timeout_secs: u64,
    /// Debug switch: use [`REDUCED_SESSION_TIMEOUT_SECS`] instead.
    pub reduced_timeout: bool,
    /// Interval between background verification polls.
    pub poll_interval_ms: u64,
    /// Recent transfers inspected per poll.
    pub search_limit: usize,
    /// Absolute matching tolerance, in lamports.
    pub amount_tolerance_lamports: u64,
    /// Real ledger matching, or the simulated debug policy.
    pub verification: VerificationMode,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            receiving_address: DEFAULT_RECEIVING_ADDRESS.to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            reduced_timeout: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            search_limit: TRANSACTION_SEARCH_LIMIT,
            amount_tolerance_lamports: AMOUNT_TOLERANCE_LAMPORTS,
            verification: VerificationMode::Ledger,
        }
    }
}

impl PaymentConfig {
    /// Session lifetime in seconds, honouring the reduced-timeout switch.
    pub fn effective_timeout_secs(&self) -> u64 {
        if self.reduced_timeout {
            REDUCED_SESSION_TIMEOUT_SECS
        } else {
            self.session_timeout_secs
        }
    }

    /// Poll interval as a `Duration`. Clamped to at least 1ms so a zero in a
    /// config file doesn't turn the poller into a busy loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// Currency Conversion
// ---------------------------------------------------------------------------

/// Settings for the fiat ↔ ledger converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Fiat currency code (e.g. `inr`).
    pub fiat_currency: String,
    /// Price API identifier of the ledger asset (e.g. `solana`).
    pub ledger_asset_id: String,
    /// Fiat per whole ledger unit, used when the live fetch fails.
    pub fallback_rate: f64,
    /// Live fetch timeout.
    pub fetch_timeout_ms: u64,
    /// Price API base URL.
    pub price_api_url: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            fiat_currency: DEFAULT_FIAT_CURRENCY.to_string(),
            ledger_asset_id: DEFAULT_LEDGER_ASSET_ID.to_string(),
            fallback_rate: FALLBACK_EXCHANGE_RATE,
            fetch_timeout_ms: PRICE_FETCH_TIMEOUT_MS,
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Settings for the ledger RPC client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub cluster: Cluster,
    /// Explicit RPC endpoint. Falls back to the cluster's public endpoint.
    pub rpc_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Bounded confirmation wait: attempts × delay.
    pub confirm_attempts: u32,
    pub confirm_delay_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cluster: Cluster::Devnet,
            rpc_url: None,
            request_timeout_ms: LEDGER_REQUEST_TIMEOUT_MS,
            confirm_attempts: CONFIRMATION_ATTEMPTS,
            confirm_delay_ms: CONFIRMATION_DELAY_MS,
        }
    }
}

impl LedgerConfig {
    /// The endpoint actually used for RPC calls.
    pub fn endpoint(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.cluster.default_rpc_url().to_string())
    }
}

// ---------------------------------------------------------------------------
// Wallet Bridge
// ---------------------------------------------------------------------------

/// App identity presented to wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Shown to the user in the wallet's connect prompt.
    pub app_url: String,
    /// Scheme of the callback deep links (`<scheme>://onConnect`).
    pub redirect_scheme: String,
    /// Cluster requested at connect time.
    pub cluster: Cluster,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            redirect_scheme: DEFAULT_REDIRECT_SCHEME.to_string(),
            cluster: Cluster::Devnet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduced_timeout_overrides_configured_value() {
        let mut config = PaymentConfig::default();
        assert_eq!(config.effective_timeout_secs(), DEFAULT_SESSION_TIMEOUT_SECS);

        config.reduced_timeout = true;
        assert_eq!(config.effective_timeout_secs(), REDUCED_SESSION_TIMEOUT_SECS);
    }

    #[test]
    fn test_tolerance_is_a_thousandth_of_a_sol() {
        assert_eq!(AMOUNT_TOLERANCE_LAMPORTS * 1_000, LAMPORTS_PER_SOL);
    }

    #[test]
    fn test_cluster_round_trips_through_str() {
        for cluster in [Cluster::MainnetBeta, Cluster::Devnet, Cluster::Testnet] {
            assert_eq!(cluster.as_str().parse::<Cluster>().unwrap(), cluster);
        }
        assert!("moonnet".parse::<Cluster>().is_err());
    }

    #[test]
    fn test_ledger_endpoint_prefers_explicit_url() {
        let mut config = LedgerConfig::default();
        assert_eq!(config.endpoint(), "https://api.devnet.solana.com");

        config.rpc_url = Some("http://127.0.0.1:8899".into());
        assert_eq!(config.endpoint(), "http://127.0.0.1:8899");
    }

    #[test]
    fn test_partial_payment_config_uses_defaults() {
        let config: PaymentConfig =
            serde_json::from_str(r#"{ "session_timeout_secs": 120 }"#).unwrap();
        assert_eq!(config.session_timeout_secs, 120);
        assert_eq!(config.search_limit, TRANSACTION_SEARCH_LIMIT);
        assert_eq!(config.verification, VerificationMode::Ledger);
    }

    #[test]
    fn test_simulated_mode_deserializes_from_tag() {
        let mode: VerificationMode =
            serde_json::from_str(r#"{ "mode": "simulated", "complete_after_secs": 5 }"#).unwrap();
        assert_eq!(
            mode,
            VerificationMode::Simulated {
                complete_after_secs: 5
            }
        );
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let config = PaymentConfig {
            poll_interval_ms: 0,
            ..PaymentConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
