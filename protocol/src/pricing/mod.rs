//! # Pricing
//!
//! Turning "₹500" into "this many lamports". Two layers:
//!
//! - A [`PriceOracle`] answers "how much fiat is one ledger unit worth right
//!   now?" and is allowed to fail.
//! - The [`CurrencyConverter`] asks the oracle once, and if the oracle fails
//!   it shrugs and uses a fixed fallback rate. A stale quote is a degraded
//!   mode, not an outage.
//!
//! The live oracle is CoinGecko's `simple/price` endpoint. It gets one shot
//! with a short timeout. No retries: a rider waiting on a payment screen
//! would rather see a fallback quote than a spinner.

pub mod converter;

pub use converter::{Conversion, CurrencyConverter, FiatConversion, RateSource};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ConverterConfig;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("price source returned HTTP {0}")]
    Status(u16),

    #[error("price source has no {fiat} quote for {asset}")]
    MissingQuote { fiat: String, asset: String },

    #[error("price source returned an unusable rate: {0}")]
    InvalidRate(f64),

    #[error("price source unavailable")]
    Unavailable,
}

/// A source of fiat-per-ledger-unit exchange rates.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fiat units per one whole ledger unit, e.g. INR per SOL.
    async fn exchange_rate(&self, fiat: &str, asset: &str) -> Result<f64, PriceError>;
}

// ---------------------------------------------------------------------------
// CoinGecko
// ---------------------------------------------------------------------------

/// Live rates from the CoinGecko `simple/price` API.
#[derive(Debug, Clone)]
pub struct CoinGeckoOracle {
    client: Client,
    base_url: String,
}

impl CoinGeckoOracle {
    pub fn new(config: &ConverterConfig) -> Result<Self, PriceError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.price_api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn exchange_rate(&self, fiat: &str, asset: &str) -> Result<f64, PriceError> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", asset), ("vs_currencies", fiat)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }

        // {"solana": {"inr": 12345.67}}
        let body: HashMap<String, HashMap<String, f64>> = response.json().await?;
        let rate = body
            .get(asset)
            .and_then(|quotes| quotes.get(fiat))
            .copied()
            .ok_or_else(|| PriceError::MissingQuote {
                fiat: fiat.to_string(),
                asset: asset.to_string(),
            })?;

        debug!(fiat, asset, rate, "fetched live exchange rate");
        Ok(rate)
    }
}

// ---------------------------------------------------------------------------
// Fixed
// ---------------------------------------------------------------------------

/// An oracle that answers with whatever it was told. `None` means "fail".
///
/// Used by tests and by the node's offline mode.
#[derive(Debug, Default)]
pub struct FixedRateOracle {
    rate: Mutex<Option<f64>>,
}

impl FixedRateOracle {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Mutex::new(Some(rate)),
        }
    }

    /// An oracle that always fails, forcing the fallback path.
    pub fn unavailable() -> Self {
        Self {
            rate: Mutex::new(None),
        }
    }

    pub fn set_rate(&self, rate: Option<f64>) {
        *self.rate.lock() = rate;
    }
}

#[async_trait]
impl PriceOracle for FixedRateOracle {
    async fn exchange_rate(&self, _fiat: &str, _asset: &str) -> Result<f64, PriceError> {
        let rate = *self.rate.lock();
        rate.ok_or(PriceError::Unavailable)
    }
}
