//! In-flight sessions and their timers.
//!
//! Two maps, never locked together:
//!
//! - `sessions`: id → `Arc<Mutex<PaymentSession>>`. The per-session mutex is
//!   what serializes the poller against manual calls.
//! - `timers`: id → `watch::Sender<bool>`. Sending `true` tells the session's
//!   polling task to stop after whatever it's doing right now.
//!
//! Lock order: a session mutex may be taken while iterating `sessions`, but
//! `sessions` is never touched while a session mutex is held.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use super::session::PaymentSession;

pub type SessionHandle = Arc<Mutex<PaymentSession>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    timers: DashMap<String, watch::Sender<bool>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: PaymentSession) -> SessionHandle {
        let id = session.transaction_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    /// Handles for every session, cloned out so callers can lock freely.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// The pending session for `(ride_id, bid_id)`, if any.
    pub fn active_for(&self, ride_id: &str, bid_id: &str) -> Option<SessionHandle> {
        self.handles().into_iter().find(|handle| {
            let s = handle.lock();
            s.is_pending() && s.ride_id == ride_id && s.bid_id == bid_id
        })
    }

    /// Consistent-per-session snapshot of everything in the registry.
    pub fn snapshot(&self) -> Vec<PaymentSession> {
        self.handles().iter().map(|h| h.lock().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session for which `doomed` returns true. Returns how many.
    pub fn retain_not(&self, doomed: impl Fn(&PaymentSession) -> bool) -> usize {
        let ids: Vec<String> = self
            .handles()
            .iter()
            .filter_map(|h| {
                let s = h.lock();
                doomed(&s).then(|| s.transaction_id.clone())
            })
            .collect();
        for id in &ids {
            self.stop_timer(id);
            self.sessions.remove(id);
        }
        ids.len()
    }

    // -- Timers -------------------------------------------------------------

    pub fn register_timer(&self, id: &str, stop: watch::Sender<bool>) {
        if let Some(previous) = self.timers.insert(id.to_string(), stop) {
            let _ = previous.send(true);
        }
    }

    /// Signal the session's poller to stop. Returns whether one was running.
    pub fn stop_timer(&self, id: &str) -> bool {
        match self.timers.remove(id) {
            Some((_, stop)) => {
                let _ = stop.send(true);
                true
            }
            None => false,
        }
    }

    pub fn has_timer(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Stop every poller. Sessions stay where they are.
    pub fn stop_all_timers(&self) -> usize {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.stop_timer(id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Lamports;
    use crate::payment::session::SessionStatus;
    use chrono::{Duration, Utc};

    fn session(id: &str, ride: &str, bid: &str) -> PaymentSession {
        let now = Utc::now();
        PaymentSession {
            transaction_id: id.into(),
            user_id: "u".into(),
            ride_id: ride.into(),
            bid_id: bid.into(),
            fiat_amount: 100.0,
            ledger_amount: Lamports(10_000_000),
            status: SessionStatus::Pending,
            start_time: now,
            end_time: now + Duration::seconds(60),
            receiving_address: "addr".into(),
            transaction_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_active_for_matches_both_ids_and_pending_only() {
        let reg = SessionRegistry::new();
        reg.insert(session("a", "ride-1", "bid-1"));
        let b = reg.insert(session("b", "ride-1", "bid-2"));

        assert_eq!(
            reg.active_for("ride-1", "bid-2").map(|h| h.lock().transaction_id.clone()),
            Some("b".to_string())
        );
        assert!(reg.active_for("ride-2", "bid-1").is_none());

        b.lock().fail(Utc::now());
        assert!(reg.active_for("ride-1", "bid-2").is_none());
    }

    #[test]
    fn test_stop_timer_signals_receiver() {
        let reg = SessionRegistry::new();
        let (tx, rx) = watch::channel(false);
        reg.register_timer("a", tx);
        assert!(reg.has_timer("a"));
        assert!(reg.stop_timer("a"));
        assert!(*rx.borrow());
        assert!(!reg.stop_timer("a"));
    }

    #[test]
    fn test_retain_not_removes_and_stops() {
        let reg = SessionRegistry::new();
        reg.insert(session("a", "r", "b1"));
        reg.insert(session("b", "r", "b2"));
        let (tx, rx) = watch::channel(false);
        reg.register_timer("a", tx);

        let removed = reg.retain_not(|s| s.transaction_id == "a");
        assert_eq!(removed, 1);
        assert_eq!(reg.len(), 1);
        assert!(*rx.borrow());
    }
}
