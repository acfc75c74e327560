//! Matching ledger transfers against a session.
//!
//! The algorithm, per poll:
//!
//! 1. Ask the ledger for the last `search_limit` transactions touching the
//!    receiving address.
//! 2. Keep the ones with a block time inside the session window that the
//!    ledger didn't mark failed.
//! 3. For each, in the order the ledger returned them, compute what it
//!    credited to the receiving address. The first credit within the
//!    absolute tolerance of the quoted amount wins.
//!
//! The tolerance is absolute on purpose. It forgives lamport-level rounding
//! on the payer's side; it does not forgive paying half.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::amount::Lamports;
use crate::ledger::{LedgerClient, LedgerError};

/// What a session expects to see on the ledger.
#[derive(Debug, Clone)]
pub struct Expectation<'a> {
    pub receiving_address: &'a str,
    pub amount: Lamports,
    pub tolerance: Lamports,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub search_limit: usize,
}

/// A transfer that satisfied an [`Expectation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedTransfer {
    pub signature: String,
    pub credited: Lamports,
}

/// Look for a transfer satisfying `expected`. `Ok(None)` is a normal outcome.
pub async fn find_matching_transfer(
    ledger: &dyn LedgerClient,
    expected: &Expectation<'_>,
) -> Result<Option<MatchedTransfer>, LedgerError> {
    let recent = ledger
        .recent_incoming_transfers(expected.receiving_address, expected.search_limit)
        .await?;

    let candidates = recent.into_iter().filter(|t| {
        !t.failed
            && t
                .block_time
                .is_some_and(|at| at >= expected.window_start && at <= expected.window_end)
    });

    for candidate in candidates {
        let Some(detail) = ledger.transaction_detail(&candidate.signature).await? else {
            trace!(signature = %candidate.signature, "transaction detail not available yet");
            continue;
        };
        if detail.failed {
            continue;
        }
        let Some(credited) = detail.credited_to(expected.receiving_address) else {
            continue;
        };

        if credited.within(expected.amount, expected.tolerance) {
            return Ok(Some(MatchedTransfer {
                signature: candidate.signature,
                credited,
            }));
        }
        debug!(
            signature = %candidate.signature,
            expected = %expected.amount,
            credited = %credited,
            "transfer in window but amount outside tolerance"
        );
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AMOUNT_TOLERANCE_LAMPORTS;
    use crate::ledger::MemoryLedger;
    use chrono::Duration;

    const MERCHANT: &str = "merchant";

    fn expectation(start: DateTime<Utc>, amount: Lamports) -> Expectation<'static> {
        Expectation {
            receiving_address: MERCHANT,
            amount,
            tolerance: Lamports(AMOUNT_TOLERANCE_LAMPORTS),
            window_start: start,
            window_end: start + Duration::seconds(300),
            search_limit: 50,
        }
    }

    #[tokio::test]
    async fn test_within_tolerance_accepted() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();
        let sig = ledger.post_transfer("payer", MERCHANT, Lamports::from_sol(0.5005), start);

        let found = find_matching_transfer(&ledger, &expectation(start, Lamports::from_sol(0.5)))
            .await
            .unwrap();
        assert_eq!(found.map(|m| m.signature), Some(sig));
    }

    #[tokio::test]
    async fn test_outside_tolerance_rejected() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();
        ledger.post_transfer("payer", MERCHANT, Lamports::from_sol(0.4980), start);

        let found = find_matching_transfer(&ledger, &expectation(start, Lamports::from_sol(0.5)))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_transfer_outside_window_ignored() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();
        ledger.post_transfer("payer", MERCHANT, Lamports(50_000_000), start - Duration::seconds(1));
        ledger.post_transfer("payer", MERCHANT, Lamports(50_000_000), start + Duration::seconds(301));

        let found = find_matching_transfer(&ledger, &expectation(start, Lamports(50_000_000)))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_failed_transaction_ignored() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();
        ledger.post_failed_transfer("payer", MERCHANT, Lamports(50_000_000), start);

        let found = find_matching_transfer(&ledger, &expectation(start, Lamports(50_000_000)))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_skips_wrong_amount_and_finds_right_one() {
        let ledger = MemoryLedger::new();
        let start = Utc::now();
        let good = ledger.post_transfer("payer", MERCHANT, Lamports(50_200_000), start);
        ledger.post_transfer("payer", MERCHANT, Lamports(1), start);

        let found = find_matching_transfer(&ledger, &expectation(start, Lamports(50_000_000)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.signature, good);
        assert_eq!(found.credited, Lamports(50_200_000));
    }

    #[tokio::test]
    async fn test_ledger_outage_is_an_error() {
        let ledger = MemoryLedger::new();
        ledger.set_unavailable(true);
        assert!(find_matching_transfer(&ledger, &expectation(Utc::now(), Lamports(1)))
            .await
            .is_err());
    }
}
