// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # RidePay Node
//!
//! Entry point for the `ridepay-node` binary. Parses CLI arguments, wires the
//! payment engine and the three wallet bridges together, and serves the
//! HTTP/WS API plus a Prometheus endpoint until told to stop.
//!
//! Subcommands:
//!
//! - `run`: start the node
//! - `keygen`: print a fresh master secret for the bridge store
//! - `version`: print build version information

mod api;
mod cli;
mod events;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use ridepay_protocol::bridge::{DeepLinkRouter, RecordingDispatcher, WalletBridgeSession, WalletProvider};
use ridepay_protocol::clock::SystemClock;
use ridepay_protocol::crypto::derive_storage_key;
use ridepay_protocol::ledger::{LedgerClient, MemoryLedger, SolanaRpcClient};
use ridepay_protocol::payment::PaymentEngine;
use ridepay_protocol::pricing::{CoinGeckoOracle, CurrencyConverter};
use ridepay_protocol::storage::BridgeStore;

use cli::{Commands, RidePayCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast capacity for the merged `/ws` event stream.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Terminal sessions older than this are dropped by the sweeper.
const TERMINAL_RETENTION_MINUTES: i64 = 60;

const MASTER_KEY_FILE: &str = "master.key";
const MASTER_SECRET_LENGTH: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RidePayCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => {
            println!("{}", generate_master_secret());
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: engine, bridges, event pump, sweeper, API and metrics.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format())?;

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        cluster = %args.cluster,
        data_dir = %args.data_dir.display(),
        "starting ridepay-node"
    );

    // --- Ledger ---
    let ledger: Arc<dyn LedgerClient> = if args.mock_ledger {
        tracing::warn!("using in-memory ledger, payments will never arrive on their own");
        Arc::new(MemoryLedger::new())
    } else {
        let client = SolanaRpcClient::new(&args.ledger_config())
            .context("failed to build ledger RPC client")?;
        tracing::info!(endpoint = %client.endpoint(), "ledger client ready");
        Arc::new(client)
    };

    // --- Pricing + engine ---
    let converter_config = args.converter_config();
    let oracle = CoinGeckoOracle::new(&converter_config).context("failed to build price client")?;
    let converter = CurrencyConverter::new(Arc::new(oracle), converter_config);

    let payment_config = args.payment_config();
    let sweep_interval = payment_config.poll_interval();
    let engine = PaymentEngine::new(
        payment_config,
        converter,
        Arc::clone(&ledger),
        Arc::new(SystemClock),
    )
    .context("invalid payment configuration")?;

    // --- Wallet bridges ---
    let store = if args.ephemeral {
        tracing::warn!("ephemeral bridge store, wallets must reconnect after restart");
        None
    } else {
        Some(open_bridge_store(&args)?)
    };

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let bridge_config = args.bridge_config();
    let mut bridges = Vec::with_capacity(WalletProvider::ALL.len());
    for provider in WalletProvider::ALL {
        let bridge = WalletBridgeSession::new(
            provider,
            bridge_config.clone(),
            dispatcher.clone(),
            Arc::clone(&ledger),
            store.clone(),
        )
        .with_context(|| format!("failed to start {provider} bridge"))?;
        tracing::info!(
            %provider,
            state = %bridge.connection_state(),
            "wallet bridge ready"
        );
        bridges.push(bridge);
    }
    let wallets = DeepLinkRouter::new(bridges);

    // --- Metrics + events ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let mut tasks = events::spawn_forwarders(
        &engine,
        &wallets,
        event_tx.clone(),
        Arc::clone(&node_metrics),
    );

    // --- Sweeper ---
    let sweeper_engine = engine.clone();
    tasks.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        let retention = chrono::Duration::minutes(TERMINAL_RETENTION_MINUTES);
        loop {
            interval.tick().await;
            let expired = sweeper_engine.cleanup_expired_sessions();
            let purged = sweeper_engine.purge_terminal(retention);
            if expired > 0 || purged > 0 {
                tracing::debug!(expired, purged, "session sweep");
            }
        }
    }));

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        cluster: args.cluster,
        engine: engine.clone(),
        wallets,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    let stopped = engine.shutdown();
    for task in tasks {
        task.abort();
    }
    tracing::info!(pollers_stopped = stopped, "ridepay-node stopped");
    Ok(())
}

/// Open the encrypted bridge store under `<data_dir>/bridges`.
fn open_bridge_store(args: &cli::RunArgs) -> Result<BridgeStore> {
    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;

    let secret = match &args.master_secret {
        Some(hex_secret) => decode_master_secret(hex_secret)?,
        None => load_or_create_master_secret(&args.data_dir)?,
    };

    let path = args.data_dir.join("bridges");
    let store = BridgeStore::open(&path, derive_storage_key(&secret))
        .with_context(|| format!("failed to open bridge store at {}", path.display()))?;
    tracing::info!(path = %path.display(), "bridge store opened");
    Ok(store)
}

fn decode_master_secret(hex_secret: &str) -> Result<Vec<u8>> {
    let secret = hex::decode(hex_secret.trim()).context("master secret is not valid hex")?;
    if secret.len() < MASTER_SECRET_LENGTH {
        bail!(
            "master secret must be at least {} bytes, got {}",
            MASTER_SECRET_LENGTH,
            secret.len()
        );
    }
    Ok(secret)
}

/// Read `master.key`, or write a new one (mode 0600) on first run.
fn load_or_create_master_secret(data_dir: &Path) -> Result<Vec<u8>> {
    let key_path = data_dir.join(MASTER_KEY_FILE);

    if key_path.exists() {
        let contents = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read {}", key_path.display()))?;
        return decode_master_secret(&contents);
    }

    let hex_secret = generate_master_secret();
    std::fs::write(&key_path, &hex_secret)
        .with_context(|| format!("failed to write master key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(key_path = %key_path.display(), "generated bridge store master key");
    decode_master_secret(&hex_secret)
}

fn generate_master_secret() -> String {
    let mut secret = [0u8; MASTER_SECRET_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    hex::encode(secret)
}

fn print_version() {
    println!("ridepay-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", rustc_version());
}

fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_secret_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_master_secret(dir.path()).unwrap();
        let second = load_or_create_master_secret(dir.path()).unwrap();
        assert_eq!(first.len(), MASTER_SECRET_LENGTH);
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join(MASTER_KEY_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn short_or_garbled_secrets_are_refused() {
        assert!(decode_master_secret("abcd").is_err());
        assert!(decode_master_secret("zz").is_err());
        assert!(decode_master_secret(&generate_master_secret()).is_ok());
    }
}
