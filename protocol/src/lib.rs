// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # RidePay Protocol
//!
//! RidePay sits between a fiat-priced ride fare and an on-ledger payment.
//! Two pieces do all the heavy lifting:
//!
//! - The **Payment Session Engine** quotes a fare in ledger units, opens a
//!   time-boxed session, and polls the ledger until a matching transfer
//!   shows up (or the clock runs out).
//! - The **Wallet Bridge** talks to third-party wallet apps over deep links
//!   using an encrypted request/response handshake, so the user's private
//!   key never leaves their wallet.
//!
//! ## Architecture
//!
//! - **config**: Constants and the serde-friendly config structs.
//! - **amount**: Lamports, because floats and money don't mix.
//! - **clock**: Injectable wall clock. Tests time-travel, production doesn't.
//! - **crypto**: X25519 key agreement, NaCl-compatible boxes, AES-GCM at rest.
//! - **pricing**: Fiat ↔ ledger conversion with a fallback rate.
//! - **ledger**: The minimal ledger interface plus RPC and in-memory clients.
//! - **payment**: Sessions, the registry, the verifier, and the engine facade.
//! - **bridge**: Wallet providers, the handshake state machine, deep-link routing.
//! - **storage**: Encrypted-at-rest persistence for bridge session material.
//!
//! ## Design Philosophy
//!
//! 1. Normal outcomes are values. "Session not found" is not an exception.
//! 2. Nothing in here terminates the host process. Every failure ends up as
//!    a state or a categorized error.
//! 3. Secrets never hit the logs. Public keys may; private ones may not.
//! 4. If it touches money, it has tests. Plural.

pub mod amount;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod payment;
pub mod pricing;
pub mod storage;
