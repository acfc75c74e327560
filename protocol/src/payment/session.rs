//! The payment session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Lamports;

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a caller supplies to open a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub fiat_amount: f64,
    pub ride_id: String,
    pub bid_id: String,
}

/// A time-boxed expectation of one ledger payment.
///
/// Identity, amounts, window and address are fixed at creation. Only
/// `status`, `transaction_hash` and `updated_at` ever change, and only
/// through the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub transaction_id: String,
    pub user_id: String,
    pub ride_id: String,
    pub bid_id: String,
    pub fiat_amount: f64,
    /// Quoted at creation. Never re-quoted, whatever the market does.
    pub ledger_amount: Lamports,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub receiving_address: String,
    /// Present iff `status == Completed`.
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }

    /// Strictly after the window closed.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    /// Whether `at` falls inside `[start_time, end_time]`.
    pub fn window_contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_time && at <= self.end_time
    }

    /// `pending → completed`. Returns `false` (and changes nothing) otherwise.
    pub fn complete(&mut self, transaction_hash: String, now: DateTime<Utc>) -> bool {
        self.transition(SessionStatus::Completed, now, Some(transaction_hash))
    }

    /// `pending → expired`, only once the window has closed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        self.is_past_due(now) && self.transition(SessionStatus::Expired, now, None)
    }

    /// `pending → failed`.
    pub fn fail(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(SessionStatus::Failed, now, None)
    }

    fn transition(&mut self, to: SessionStatus, now: DateTime<Utc>, hash: Option<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = to;
        self.transaction_hash = hash;
        // updated_at never moves backwards, even if the clock does.
        self.updated_at = now.max(self.updated_at);
        true
    }
}
