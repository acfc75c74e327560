//! # Wallet Bridge
//!
//! The payer's key lives in their wallet app and stays there. We talk to
//! that app the only way a mobile app can: by opening a URL and waiting for
//! it to open one of ours back.
//!
//! ```text
//! provider.rs  Per-wallet URLs, parameter names and error codes
//! session.rs   The handshake state machine, one per provider
//! response.rs  Normalizing each wallet's idea of a sign response
//! deeplink.rs  Opening links out, routing callbacks in
//! error.rs     What can go wrong, with stable codes
//! ```
//!
//! ## The handshake
//!
//! 1. We send our X25519 public key in a connect link.
//! 2. The wallet answers with its own public key and a box sealed under the
//!    shared secret, holding the payer's address and a session token.
//! 3. Every sign request is sealed under that same secret and carries the
//!    token back. The wallet returns a sealed signed transaction, which we
//!    check and broadcast ourselves (or a signature, if it broadcast for us).
//!
//! Nothing on the wire is readable by the OS, the other apps on the phone,
//! or anyone watching URLs go by.

pub mod deeplink;
pub mod error;
pub mod provider;
pub mod response;
pub mod session;

pub use deeplink::{DeepLinkDispatcher, DeepLinkRouter, RecordingDispatcher, RoutedCallback};
pub use error::{BridgeError, RejectionKind};
pub use provider::{CallbackKind, ProviderProfile, WalletProvider};
pub use response::{decode_sign_response, ConnectResponse, SignedPayload};
pub use session::{
    BridgeEvent, BridgeStatus, CallbackOutcome, ConnectionState, DispatchedLink, LinkTarget,
    SignOutcome, SubmittedBy, WalletBridgeSession,
};
