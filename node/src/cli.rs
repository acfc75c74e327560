//! # CLI Interface
//!
//! Command-line arguments for `ridepay-node`, via `clap` derive. Every flag
//! has an environment fallback so the node runs the same from a shell, a
//! systemd unit or a container.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ridepay_protocol::config::{
    BridgeConfig, Cluster, ConverterConfig, LedgerConfig, PaymentConfig, VerificationMode,
    DEFAULT_APP_URL, DEFAULT_FIAT_CURRENCY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PRICE_API_URL,
    DEFAULT_RECEIVING_ADDRESS, DEFAULT_REDIRECT_SCHEME, DEFAULT_SESSION_TIMEOUT_SECS,
    FALLBACK_EXCHANGE_RATE,
};

use crate::logging::LogFormat;

/// RidePay node.
///
/// Hosts the payment session engine and one wallet bridge per provider
/// behind an HTTP API, and exposes Prometheus metrics on a second port.
#[derive(Parser, Debug)]
#[command(
    name = "ridepay-node",
    about = "RidePay payment session and wallet-bridge service",
    version,
    propagate_version = true
)]
pub struct RidePayCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print a fresh hex-encoded master secret for the bridge store.
    Keygen,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory for the bridge store and the generated master key.
    #[arg(long, short = 'd', env = "RIDEPAY_DATA_DIR", default_value = "./ridepay-data")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "RIDEPAY_API_PORT", default_value_t = 8080)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "RIDEPAY_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Log output: `pretty` or `json`.
    #[arg(long, env = "RIDEPAY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Ledger cluster: mainnet-beta, devnet or testnet.
    #[arg(long, env = "SOLANA_CLUSTER", default_value = "devnet")]
    pub cluster: Cluster,

    /// Explicit RPC endpoint. Defaults to the cluster's public one.
    #[arg(long, env = "DEVNET_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Use an in-process ledger instead of RPC. Demo and testing only.
    #[arg(long, env = "RIDEPAY_MOCK_LEDGER")]
    pub mock_ledger: bool,

    /// Complete any session older than this many seconds without looking at
    /// the ledger. Demo only; never set this in production.
    #[arg(long, env = "RIDEPAY_SIMULATE_AFTER_SECS")]
    pub simulate_after_secs: Option<u64>,

    /// Address payers send funds to.
    #[arg(long, env = "RIDEPAY_RECEIVING_ADDRESS", default_value = DEFAULT_RECEIVING_ADDRESS)]
    pub receiving_address: String,

    /// Session lifetime in seconds.
    #[arg(long, env = "RIDEPAY_SESSION_TIMEOUT_SECS", default_value_t = DEFAULT_SESSION_TIMEOUT_SECS)]
    pub session_timeout_secs: u64,

    /// Use the short debug timeout instead.
    #[arg(long, env = "RIDEPAY_REDUCED_TIMEOUT")]
    pub reduced_timeout: bool,

    /// Interval between ledger polls per session, in milliseconds.
    #[arg(long, env = "RIDEPAY_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Fiat currency fares are quoted in.
    #[arg(long, env = "RIDEPAY_FIAT_CURRENCY", default_value = DEFAULT_FIAT_CURRENCY)]
    pub fiat_currency: String,

    /// Fiat per SOL when the price API is unreachable.
    #[arg(long, env = "RIDEPAY_FALLBACK_RATE", default_value_t = FALLBACK_EXCHANGE_RATE)]
    pub fallback_rate: f64,

    /// Price API base URL.
    #[arg(long, env = "RIDEPAY_PRICE_API_URL", default_value = DEFAULT_PRICE_API_URL)]
    pub price_api_url: String,

    /// App URL shown in the wallet's connect prompt.
    #[arg(long, env = "RIDEPAY_APP_URL", default_value = DEFAULT_APP_URL)]
    pub app_url: String,

    /// Scheme wallets redirect back to.
    #[arg(long, env = "RIDEPAY_REDIRECT_SCHEME", default_value = DEFAULT_REDIRECT_SCHEME)]
    pub redirect_scheme: String,

    /// Hex-encoded master secret for the bridge store.
    ///
    /// If omitted, the node reads `master.key` from the data directory and
    /// creates it on first run.
    #[arg(long, env = "RIDEPAY_MASTER_SECRET", hide_env_values = true)]
    pub master_secret: Option<String>,

    /// Keep bridge state in memory only. Wallets must reconnect after a
    /// restart.
    #[arg(long, env = "RIDEPAY_EPHEMERAL")]
    pub ephemeral: bool,
}

impl RunArgs {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.log_format)
    }

    pub fn payment_config(&self) -> PaymentConfig {
        PaymentConfig {
            receiving_address: self.receiving_address.clone(),
            session_timeout_secs: self.session_timeout_secs,
            reduced_timeout: self.reduced_timeout,
            poll_interval_ms: self.poll_interval_ms,
            verification: match self.simulate_after_secs {
                Some(complete_after_secs) => VerificationMode::Simulated { complete_after_secs },
                None => VerificationMode::Ledger,
            },
            ..PaymentConfig::default()
        }
    }

    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            fiat_currency: self.fiat_currency.clone(),
            fallback_rate: self.fallback_rate,
            price_api_url: self.price_api_url.clone(),
            ..ConverterConfig::default()
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            cluster: self.cluster,
            rpc_url: self.rpc_url.clone(),
            ..LedgerConfig::default()
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            app_url: self.app_url.clone(),
            redirect_scheme: self.redirect_scheme.clone(),
            cluster: self.cluster,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        RidePayCli::command().debug_assert();
    }

    #[test]
    fn run_args_map_onto_protocol_configs() {
        let cli = RidePayCli::parse_from([
            "ridepay-node",
            "run",
            "--cluster",
            "testnet",
            "--reduced-timeout",
            "--simulate-after-secs",
            "15",
            "--fallback-rate",
            "9000",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.ledger_config().endpoint(), "https://api.testnet.solana.com");
        assert_eq!(args.bridge_config().cluster, Cluster::Testnet);

        let payment = args.payment_config();
        assert_eq!(payment.effective_timeout_secs(), 60);
        assert_eq!(
            payment.verification,
            VerificationMode::Simulated {
                complete_after_secs: 15
            }
        );
        assert_eq!(args.converter_config().fallback_rate, 9000.0);
    }

    #[test]
    fn defaults_point_at_devnet_with_real_verification() {
        let cli = RidePayCli::parse_from(["ridepay-node", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.cluster, Cluster::Devnet);
        assert_eq!(args.payment_config().verification, VerificationMode::Ledger);
        assert!(!args.mock_ledger);
    }
}
