//! # PaymentEngine
//!
//! The facade the rest of the world talks to. It owns the converter, the
//! ledger handle, the clock and the registry, and it is the only thing that
//! spawns polling tasks.
//!
//! `PaymentEngine` is a cheap `Clone` around an `Arc`. Construct one at
//! startup and hand clones to whoever needs it; there is no global registry
//! hiding behind a `static`.
//!
//! ## Concurrency
//!
//! Ledger calls happen with no lock held. The sequence for a verification is
//! snapshot → query → re-lock → re-check `pending` → transition. If the
//! session was cancelled, expired or completed by someone else while we were
//! out talking to the ledger, the result is dropped on the floor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::registry::{SessionHandle, SessionRegistry};
use super::session::{CreateSessionRequest, PaymentSession, SessionStatus};
use super::verifier::{find_matching_transfer, Expectation};
use super::PaymentError;
use crate::amount::Lamports;
use crate::clock::Clock;
use crate::config::{PaymentConfig, VerificationMode};
use crate::crypto::is_valid_address;
use crate::ledger::LedgerClient;
use crate::pricing::{CurrencyConverter, RateSource};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// Returned by [`PaymentEngine::create_session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session: PaymentSession,
    pub receiving_address: String,
    pub time_window_secs: u64,
    /// Fiat per whole ledger unit used for the quote.
    pub exchange_rate: f64,
    /// `Fallback` means the live price source was unavailable.
    pub rate_source: RateSource,
}

/// Returned by [`PaymentEngine::get_status`]. "Not found" is a report, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub transaction_id: String,
    pub found: bool,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Confirmed amount, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_amount: Option<Lamports>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    fn not_found(transaction_id: &str) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            found: false,
            status: SessionStatus::Failed,
            transaction_hash: None,
            ledger_amount: None,
            end_time: None,
            message: Some("session not found".to_string()),
        }
    }

    fn from_session(s: &PaymentSession) -> Self {
        let completed = s.status == SessionStatus::Completed;
        Self {
            transaction_id: s.transaction_id.clone(),
            found: true,
            status: s.status,
            transaction_hash: s.transaction_hash.clone(),
            ledger_amount: completed.then_some(s.ledger_amount),
            end_time: Some(s.end_time),
            message: None,
        }
    }
}

/// Lifecycle notifications, for metrics and anyone else who cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Created {
        transaction_id: String,
        ledger_amount: Lamports,
        degraded_rate: bool,
    },
    Completed {
        transaction_id: String,
        transaction_hash: String,
    },
    Expired {
        transaction_id: String,
    },
    Cancelled {
        transaction_id: String,
    },
    /// A verification attempt finished without a match.
    Polled {
        transaction_id: String,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Inner {
    config: PaymentConfig,
    window: Duration,
    converter: CurrencyConverter,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    registry: SessionRegistry,
    events: broadcast::Sender<SessionEvent>,
}

/// The payment session engine. Clone freely.
#[derive(Clone)]
pub struct PaymentEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PaymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentEngine")
            .field("sessions", &self.inner.registry.len())
            .field("pollers", &self.inner.registry.timer_count())
            .finish_non_exhaustive()
    }
}

impl PaymentEngine {
    pub fn new(
        config: PaymentConfig,
        converter: CurrencyConverter,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PaymentError> {
        if !is_valid_address(&config.receiving_address) {
            return Err(PaymentError::InvalidReceivingAddress(
                config.receiving_address.clone(),
            ));
        }

        let secs = config.effective_timeout_secs();
        let window = Duration::from_std(std::time::Duration::from_secs(secs))
            .ok()
            .filter(|w| *w > Duration::zero())
            .ok_or(PaymentError::InvalidTimeout(secs))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                window,
                converter,
                ledger,
                clock,
                registry: SessionRegistry::new(),
                events,
            }),
        })
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // -- createSession ------------------------------------------------------

    /// Quote the fare, open a pending session and start polling for it.
    ///
    /// Must be called from within a tokio runtime (it spawns the poller).
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionCreated, PaymentError> {
        if !request.fiat_amount.is_finite() || request.fiat_amount <= 0.0 {
            return Err(PaymentError::InvalidAmount(request.fiat_amount));
        }
        for (name, value) in [
            ("user_id", &request.user_id),
            ("ride_id", &request.ride_id),
            ("bid_id", &request.bid_id),
        ] {
            if value.trim().is_empty() {
                return Err(PaymentError::MissingField(name));
            }
        }

        let conversion = self.inner.converter.to_ledger_amount(request.fiat_amount).await;

        let start = self.now();
        let end = start
            .checked_add_signed(self.inner.window)
            .ok_or(PaymentError::InvalidTimeout(self.inner.config.effective_timeout_secs()))?;
        let transaction_id = format!(
            "pay_{}_{}",
            start.timestamp_millis(),
            Uuid::new_v4().simple()
        );

        let session = PaymentSession {
            transaction_id: transaction_id.clone(),
            user_id: request.user_id,
            ride_id: request.ride_id,
            bid_id: request.bid_id,
            fiat_amount: request.fiat_amount,
            ledger_amount: conversion.lamports,
            status: SessionStatus::Pending,
            start_time: start,
            end_time: end,
            receiving_address: self.inner.config.receiving_address.clone(),
            transaction_hash: None,
            created_at: start,
            updated_at: start,
        };

        self.inner.registry.insert(session.clone());
        self.spawn_poller(transaction_id.clone());

        info!(
            transaction_id = %transaction_id,
            ride_id = %session.ride_id,
            fiat_amount = session.fiat_amount,
            ledger_amount = %session.ledger_amount,
            rate_source = ?conversion.source,
            "payment session created"
        );
        self.emit(SessionEvent::Created {
            transaction_id,
            ledger_amount: conversion.lamports,
            degraded_rate: conversion.source == RateSource::Fallback,
        });

        Ok(SessionCreated {
            receiving_address: session.receiving_address.clone(),
            time_window_secs: self.inner.config.effective_timeout_secs(),
            exchange_rate: conversion.rate,
            rate_source: conversion.source,
            session,
        })
    }

    // -- getStatus ----------------------------------------------------------

    /// Current status, expiring the session first if its window has closed.
    pub fn get_status(&self, transaction_id: &str) -> StatusReport {
        let Some(handle) = self.inner.registry.get(transaction_id) else {
            return StatusReport::not_found(transaction_id);
        };

        let (report, expired) = {
            let mut s = handle.lock();
            let expired = s.expire_if_due(self.now());
            (StatusReport::from_session(&s), expired)
        };
        if expired {
            self.on_expired(transaction_id);
        }
        report
    }

    /// Full session record, if known. Does not apply lazy expiry.
    pub fn get_session(&self, transaction_id: &str) -> Option<PaymentSession> {
        self.inner
            .registry
            .get(transaction_id)
            .map(|h| h.lock().clone())
    }

    // -- verifyNow ----------------------------------------------------------

    /// Check the ledger once for a matching transfer.
    ///
    /// Returns `true` only if *this call* completed the session. Unknown,
    /// terminal and past-due sessions return `false` without touching the
    /// ledger. Ledger failures are logged and also return `false`; the next
    /// poll will try again.
    pub async fn verify_now(&self, transaction_id: &str) -> bool {
        let Some(handle) = self.inner.registry.get(transaction_id) else {
            return false;
        };

        let now = self.now();
        let snapshot = {
            let s = handle.lock();
            if !s.is_pending() || s.is_past_due(now) {
                return false;
            }
            s.clone()
        };

        let Some(hash) = self.find_payment(&snapshot, now).await else {
            self.emit(SessionEvent::Polled {
                transaction_id: transaction_id.to_string(),
            });
            return false;
        };

        self.try_complete(&handle, transaction_id, hash)
    }

    async fn find_payment(&self, session: &PaymentSession, now: DateTime<Utc>) -> Option<String> {
        match &self.inner.config.verification {
            VerificationMode::Ledger => {
                let expected = Expectation {
                    receiving_address: &session.receiving_address,
                    amount: session.ledger_amount,
                    tolerance: Lamports(self.inner.config.amount_tolerance_lamports),
                    window_start: session.start_time,
                    window_end: session.end_time,
                    search_limit: self.inner.config.search_limit,
                };
                match find_matching_transfer(self.inner.ledger.as_ref(), &expected).await {
                    Ok(found) => found.map(|m| {
                        debug!(
                            transaction_id = %session.transaction_id,
                            signature = %m.signature,
                            credited = %m.credited,
                            "matching transfer found"
                        );
                        m.signature
                    }),
                    Err(e) => {
                        warn!(
                            transaction_id = %session.transaction_id,
                            error = %e,
                            "ledger query failed, will retry on next poll"
                        );
                        None
                    }
                }
            }
            VerificationMode::Simulated { complete_after_secs } => {
                let age = (now - session.start_time).to_std().ok()?;
                (age.as_secs() >= *complete_after_secs)
                    .then(|| format!("mock_{}", now.timestamp_millis()))
            }
        }
    }

    fn try_complete(&self, handle: &SessionHandle, transaction_id: &str, hash: String) -> bool {
        let completed = handle.lock().complete(hash.clone(), self.now());
        if !completed {
            debug!(
                transaction_id = %transaction_id,
                "session left pending while verifying, discarding match"
            );
            return false;
        }

        self.inner.registry.stop_timer(transaction_id);
        info!(transaction_id = %transaction_id, transaction_hash = %hash, "payment verified");
        self.emit(SessionEvent::Completed {
            transaction_id: transaction_id.to_string(),
            transaction_hash: hash,
        });
        true
    }

    // -- cancelSession ------------------------------------------------------

    /// Cancel a pending session: mark it failed, stop its poller, forget it.
    pub fn cancel_session(&self, transaction_id: &str) -> Result<PaymentSession, PaymentError> {
        let handle = self
            .inner
            .registry
            .get(transaction_id)
            .ok_or_else(|| PaymentError::NotFound(transaction_id.to_string()))?;

        let cancelled = {
            let mut s = handle.lock();
            if !s.fail(self.now()) {
                return Err(PaymentError::NotPending {
                    id: transaction_id.to_string(),
                    status: s.status,
                });
            }
            s.clone()
        };

        self.inner.registry.stop_timer(transaction_id);
        self.inner.registry.remove(transaction_id);
        info!(transaction_id = %transaction_id, "payment session cancelled");
        self.emit(SessionEvent::Cancelled {
            transaction_id: transaction_id.to_string(),
        });
        Ok(cancelled)
    }

    // -- getActiveSessionFor ------------------------------------------------

    /// The pending session for this ride and bid, if there is one.
    pub fn get_active_session_for(&self, ride_id: &str, bid_id: &str) -> Option<PaymentSession> {
        let handle = self.inner.registry.active_for(ride_id, bid_id)?;
        let (session, expired) = {
            let mut s = handle.lock();
            let expired = s.expire_if_due(self.now());
            (s.clone(), expired)
        };
        if expired {
            self.on_expired(&session.transaction_id);
            return None;
        }
        Some(session)
    }

    // -- Housekeeping -------------------------------------------------------

    /// Expire every pending session whose window has closed. Returns how many.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = self.now();
        let expired: Vec<String> = self
            .inner
            .registry
            .handles()
            .iter()
            .filter_map(|h| {
                let mut s = h.lock();
                s.expire_if_due(now).then(|| s.transaction_id.clone())
            })
            .collect();

        for id in &expired {
            self.on_expired(id);
        }
        expired.len()
    }

    /// Drop completed and expired sessions last updated more than `older_than` ago.
    pub fn purge_terminal(&self, older_than: Duration) -> usize {
        let cutoff = self.now() - older_than;
        let purged = self
            .inner
            .registry
            .retain_not(|s| s.status.is_terminal() && s.updated_at < cutoff);
        if purged > 0 {
            debug!(purged, "purged terminal payment sessions");
        }
        purged
    }

    pub fn list_sessions(&self) -> Vec<PaymentSession> {
        self.inner.registry.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of sessions with a live poller.
    pub fn active_poller_count(&self) -> usize {
        self.inner.registry.timer_count()
    }

    /// Stop every poller. Sessions are left as they are.
    pub fn shutdown(&self) -> usize {
        let stopped = self.inner.registry.stop_all_timers();
        info!(stopped, "payment engine pollers stopped");
        stopped
    }

    fn on_expired(&self, transaction_id: &str) {
        self.inner.registry.stop_timer(transaction_id);
        info!(transaction_id = %transaction_id, "payment session expired");
        self.emit(SessionEvent::Expired {
            transaction_id: transaction_id.to_string(),
        });
    }

    // -- Polling ------------------------------------------------------------

    fn spawn_poller(&self, transaction_id: String) {
        let (stop_tx, stop_rx) = watch::channel(false);
        self.inner.registry.register_timer(&transaction_id, stop_tx);
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.poll_interval();
        tokio::spawn(poll_loop(weak, transaction_id, interval, stop_rx));
    }

    /// One poller tick. Returns whether polling should continue.
    async fn poll_once(&self, transaction_id: &str) -> bool {
        let Some(handle) = self.inner.registry.get(transaction_id) else {
            return false;
        };

        let expired = {
            let mut s = handle.lock();
            if s.expire_if_due(self.now()) {
                true
            } else if !s.is_pending() {
                return false;
            } else {
                false
            }
        };
        if expired {
            self.on_expired(transaction_id);
            return false;
        }

        if self.verify_now(transaction_id).await {
            return false;
        }
        let still_pending = handle.lock().is_pending();
        still_pending
    }
}

async fn poll_loop(
    engine: Weak<Inner>,
    transaction_id: String,
    interval: std::time::Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the session is brand new.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = engine.upgrade() else { break };
                let engine = PaymentEngine { inner };
                if !engine.poll_once(&transaction_id).await {
                    break;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    trace!(transaction_id = %transaction_id, "poller exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ConverterConfig, DEFAULT_RECEIVING_ADDRESS};
    use crate::ledger::MemoryLedger;
    use crate::pricing::FixedRateOracle;

    struct Harness {
        engine: PaymentEngine,
        ledger: Arc<MemoryLedger>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: PaymentConfig) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::starting_now());
        let converter = CurrencyConverter::new(
            Arc::new(FixedRateOracle::unavailable()),
            ConverterConfig::default(),
        );
        let engine =
            PaymentEngine::new(config, converter, ledger.clone(), clock.clone()).unwrap();
        Harness {
            engine,
            ledger,
            clock,
        }
    }

    fn request(ride: &str, bid: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            user_id: "user-1".into(),
            fiat_amount: 500.0,
            ride_id: ride.into(),
            bid_id: bid.into(),
        }
    }

    #[tokio::test]
    async fn test_create_session_quotes_and_windows() {
        let h = harness(PaymentConfig::default());
        let created = h.engine.create_session(request("r1", "b1")).await.unwrap();

        assert_eq!(created.session.ledger_amount, Lamports(50_000_000));
        assert_eq!(created.rate_source, RateSource::Fallback);
        assert_eq!(created.time_window_secs, 300);
        assert!(created.session.end_time > created.session.start_time);
        assert!(created.session.transaction_id.starts_with("pay_"));
        assert_eq!(created.receiving_address, DEFAULT_RECEIVING_ADDRESS);
        assert_eq!(h.engine.active_poller_count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let h = harness(PaymentConfig::default());
        let mut bad = request("r1", "b1");
        bad.fiat_amount = 0.0;
        assert_eq!(
            h.engine.create_session(bad).await.unwrap_err(),
            PaymentError::InvalidAmount(0.0)
        );

        let mut bad = request("r1", "b1");
        bad.ride_id = "  ".into();
        assert_eq!(
            h.engine.create_session(bad).await.unwrap_err(),
            PaymentError::MissingField("ride_id")
        );
        assert_eq!(h.engine.session_count(), 0);
    }

    #[test]
    fn test_rejects_invalid_receiving_address() {
        let config = PaymentConfig {
            receiving_address: "not-an-address".into(),
            ..PaymentConfig::default()
        };
        let converter = CurrencyConverter::new(
            Arc::new(FixedRateOracle::unavailable()),
            ConverterConfig::default(),
        );
        let result = PaymentEngine::new(
            config,
            converter,
            Arc::new(MemoryLedger::new()),
            Arc::new(ManualClock::starting_now()),
        );
        assert!(matches!(result, Err(PaymentError::InvalidReceivingAddress(_))));
    }

    #[tokio::test]
    async fn test_unknown_session_reports_not_found() {
        let h = harness(PaymentConfig::default());
        let report = h.engine.get_status("pay_nope");
        assert!(!report.found);
        assert_eq!(report.status, SessionStatus::Failed);
        assert!(!h.engine.verify_now("pay_nope").await);
    }

    #[tokio::test]
    async fn test_verify_completes_and_is_idempotent() {
        let h = harness(PaymentConfig::default());
        let created = h.engine.create_session(request("r1", "b1")).await.unwrap();
        let id = created.session.transaction_id.clone();

        h.clock.advance(Duration::seconds(5));
        let sig = h.ledger.post_transfer(
            "payer",
            DEFAULT_RECEIVING_ADDRESS,
            Lamports(50_200_000),
            h.clock.now(),
        );

        assert!(h.engine.verify_now(&id).await);
        let first = h.engine.get_status(&id);
        assert_eq!(first.status, SessionStatus::Completed);
        assert_eq!(first.transaction_hash.as_deref(), Some(sig.as_str()));
        assert_eq!(first.ledger_amount, Some(Lamports(50_000_000)));

        assert!(!h.engine.verify_now(&id).await);
        assert_eq!(h.engine.get_status(&id), first);
        assert_eq!(h.engine.active_poller_count(), 0);
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_status() {
        let h = harness(PaymentConfig::default());
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;

        h.clock.advance(Duration::seconds(301));
        assert_eq!(h.engine.get_status(&id).status, SessionStatus::Expired);
        // A late transfer can't resurrect it.
        h.ledger.post_transfer(
            "payer",
            DEFAULT_RECEIVING_ADDRESS,
            Lamports(50_000_000),
            h.clock.now(),
        );
        assert!(!h.engine.verify_now(&id).await);
        assert_eq!(h.engine.get_status(&id).status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_cancel_removes_from_active_lookup() {
        let h = harness(PaymentConfig::default());
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;

        assert!(h.engine.get_active_session_for("r1", "b1").is_some());
        let cancelled = h.engine.cancel_session(&id).unwrap();
        assert_eq!(cancelled.status, SessionStatus::Failed);
        assert!(h.engine.get_active_session_for("r1", "b1").is_none());
        assert!(!h.engine.get_status(&id).found);
        assert_eq!(
            h.engine.cancel_session(&id).unwrap_err(),
            PaymentError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn test_cancel_terminal_session_is_rejected() {
        let h = harness(PaymentConfig::default());
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;
        h.clock.advance(Duration::seconds(400));
        h.engine.get_status(&id);

        assert!(matches!(
            h.engine.cancel_session(&id),
            Err(PaymentError::NotPending {
                status: SessionStatus::Expired,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_and_purge() {
        let h = harness(PaymentConfig::default());
        h.engine.create_session(request("r1", "b1")).await.unwrap();
        h.engine.create_session(request("r2", "b2")).await.unwrap();

        h.clock.advance(Duration::seconds(301));
        assert_eq!(h.engine.cleanup_expired_sessions(), 2);
        assert_eq!(h.engine.cleanup_expired_sessions(), 0);
        assert_eq!(h.engine.active_poller_count(), 0);

        assert_eq!(h.engine.purge_terminal(Duration::minutes(10)), 0);
        h.clock.advance(Duration::minutes(11));
        assert_eq!(h.engine.purge_terminal(Duration::minutes(10)), 2);
        assert_eq!(h.engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_mode_completes_after_delay() {
        let h = harness(PaymentConfig {
            verification: VerificationMode::Simulated {
                complete_after_secs: 30,
            },
            ..PaymentConfig::default()
        });
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;

        h.clock.advance(Duration::seconds(29));
        assert!(!h.engine.verify_now(&id).await);
        h.clock.advance(Duration::seconds(1));
        assert!(h.engine.verify_now(&id).await);
        let report = h.engine.get_status(&id);
        assert!(report.transaction_hash.unwrap().starts_with("mock_"));
    }

    #[tokio::test]
    async fn test_ledger_outage_leaves_session_pending() {
        let h = harness(PaymentConfig::default());
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;
        h.ledger.set_unavailable(true);
        assert!(!h.engine.verify_now(&id).await);
        assert_eq!(h.engine.get_status(&id).status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_events_published() {
        let h = harness(PaymentConfig::default());
        let mut events = h.engine.subscribe();
        let id = h
            .engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;
        h.engine.cancel_session(&id).unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::Created { degraded_rate: true, .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Cancelled { transaction_id: id }
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_pollers() {
        let h = harness(PaymentConfig::default());
        h.engine.create_session(request("r1", "b1")).await.unwrap();
        h.engine.create_session(request("r2", "b2")).await.unwrap();
        assert_eq!(h.engine.shutdown(), 2);
        assert_eq!(h.engine.active_poller_count(), 0);
        assert_eq!(h.engine.session_count(), 2);
    }

    /// Holds the first transfer lookup until released.
    struct GatedLedger {
        inner: Arc<MemoryLedger>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        gated: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl LedgerClient for GatedLedger {
        async fn recent_incoming_transfers(
            &self,
            address: &str,
            limit: usize,
        ) -> Result<Vec<crate::ledger::TransferSummary>, crate::ledger::LedgerError> {
            if self.gated.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.recent_incoming_transfers(address, limit).await
        }

        async fn transaction_detail(
            &self,
            signature: &str,
        ) -> Result<Option<crate::ledger::TransactionDetail>, crate::ledger::LedgerError> {
            self.inner.transaction_detail(signature).await
        }

        async fn broadcast(&self, signed_transaction: &[u8]) -> Result<String, crate::ledger::LedgerError> {
            self.inner.broadcast(signed_transaction).await
        }

        async fn confirm(
            &self,
            signature: &str,
        ) -> Result<crate::ledger::ConfirmationStatus, crate::ledger::LedgerError> {
            self.inner.confirm(signature).await
        }
    }

    #[tokio::test]
    async fn test_cancel_during_verification_discards_match() {
        let memory = Arc::new(MemoryLedger::new());
        let ledger = Arc::new(GatedLedger {
            inner: memory.clone(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            gated: std::sync::atomic::AtomicBool::new(true),
        });
        let clock = Arc::new(ManualClock::starting_now());
        let converter = CurrencyConverter::new(
            Arc::new(FixedRateOracle::unavailable()),
            ConverterConfig::default(),
        );
        // Keep the background poller out of the way.
        let config = PaymentConfig {
            poll_interval_ms: 3_600_000,
            ..PaymentConfig::default()
        };
        let engine = PaymentEngine::new(config, converter, ledger.clone(), clock.clone()).unwrap();

        let id = engine
            .create_session(request("r1", "b1"))
            .await
            .unwrap()
            .session
            .transaction_id;
        clock.advance(Duration::seconds(5));
        memory.post_transfer(
            "payer",
            DEFAULT_RECEIVING_ADDRESS,
            Lamports(50_000_000),
            clock.now(),
        );

        let verifying = {
            let engine = engine.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.verify_now(&id).await })
        };
        ledger.entered.notified().await;

        engine.cancel_session(&id).unwrap();
        ledger.release.notify_one();

        assert!(!verifying.await.unwrap());
        assert!(!engine.get_status(&id).found);
        assert!(engine.get_active_session_for("r1", "b1").is_none());
    }
}
