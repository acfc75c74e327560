//! Fiat ↔ ledger conversion with a fallback rate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::{PriceError, PriceOracle};
use crate::amount::Lamports;
use crate::config::ConverterConfig;

/// Where a conversion's rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Live,
    Fallback,
}

/// Result of converting fiat into ledger units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub lamports: Lamports,
    /// Fiat per whole ledger unit actually used.
    pub rate: f64,
    pub source: RateSource,
}

/// Result of converting ledger units back into fiat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiatConversion {
    pub fiat_amount: f64,
    pub rate: f64,
    pub source: RateSource,
}

/// Converts fare amounts using a [`PriceOracle`], falling back to a fixed rate.
///
/// Stateless apart from the oracle handle, so one converter can serve every
/// session concurrently.
#[derive(Clone)]
pub struct CurrencyConverter {
    oracle: Arc<dyn PriceOracle>,
    config: ConverterConfig,
}

impl std::fmt::Debug for CurrencyConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyConverter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CurrencyConverter {
    pub fn new(oracle: Arc<dyn PriceOracle>, config: ConverterConfig) -> Self {
        Self { oracle, config }
    }

    /// Current rate, or the fallback if the oracle fails or talks nonsense.
    pub async fn current_rate(&self) -> (f64, RateSource) {
        let fetched = self
            .oracle
            .exchange_rate(&self.config.fiat_currency, &self.config.ledger_asset_id)
            .await
            .and_then(|rate| {
                if rate.is_finite() && rate > 0.0 {
                    Ok(rate)
                } else {
                    Err(PriceError::InvalidRate(rate))
                }
            });

        match fetched {
            Ok(rate) => (rate, RateSource::Live),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback_rate = self.config.fallback_rate,
                    "live exchange rate unavailable, using fallback"
                );
                (self.config.fallback_rate, RateSource::Fallback)
            }
        }
    }

    /// Convert a fiat amount into lamports. Never yields less than one lamport
    /// for a positive input; callers validate `fiat_amount > 0` beforehand.
    pub async fn to_ledger_amount(&self, fiat_amount: f64) -> Conversion {
        let (rate, source) = self.current_rate().await;
        let lamports = Lamports::from_sol(fiat_amount / rate).max(Lamports(1));
        Conversion {
            lamports,
            rate,
            source,
        }
    }

    /// Convert lamports into fiat at the current (or fallback) rate.
    pub async fn to_fiat_amount(&self, amount: Lamports) -> FiatConversion {
        let (rate, source) = self.current_rate().await;
        FiatConversion {
            fiat_amount: amount.as_sol() * rate,
            rate,
            source,
        }
    }
}
