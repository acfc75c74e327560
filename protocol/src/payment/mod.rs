//! # Payment Sessions
//!
//! A payment session is a promise with a deadline: "send *this many*
//! lamports to *that address* within *five minutes*, and we'll notice."
//!
//! ```text
//! session.rs    PaymentSession and its one-way state machine
//! registry.rs   In-flight sessions plus their polling timers
//! verifier.rs   Matching ledger transfers against a session
//! engine.rs     The public facade: create / status / verify / cancel
//! ```
//!
//! ## State machine
//!
//! ```text
//!            verify matches
//! pending ───────────────────▶ completed
//!    │  now > end_time
//!    ├───────────────────────▶ expired
//!    │  cancel
//!    └───────────────────────▶ failed (and removed)
//! ```
//!
//! Nothing ever goes back to `pending`. Every transition is applied under
//! the session's own mutex after re-checking that it is still pending, so
//! the poller and a manual verify can race all they like and only one wins.

pub mod engine;
pub mod registry;
pub mod session;
pub mod verifier;

pub use engine::{PaymentEngine, SessionCreated, SessionEvent, StatusReport};
pub use registry::SessionRegistry;
pub use session::{CreateSessionRequest, PaymentSession, SessionStatus};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PaymentError {
    #[error("fiat amount must be a finite number greater than zero, got {0}")]
    InvalidAmount(f64),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("receiving address {0:?} is not a valid ledger address")]
    InvalidReceivingAddress(String),

    #[error("session timeout of {0}s is out of range")]
    InvalidTimeout(u64),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {id} is {status}, not pending")]
    NotPending { id: String, status: SessionStatus },
}
