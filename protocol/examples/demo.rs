//! Terminal walkthrough of one RidePay fare, start to finish.
//!
//! Quotes a fare, opens a payment session, pairs a (simulated) Phantom
//! wallet over the encrypted deep-link handshake, has it sign and send the
//! transfer, and watches the engine match the payment. Everything runs
//! against the in-memory ledger; no network, no real wallet.
//!
//! Run with:
//!   cargo run --example demo

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use url::Url;

use ridepay_protocol::bridge::{
    CallbackOutcome, DeepLinkRouter, RecordingDispatcher, WalletBridgeSession, WalletProvider,
};
use ridepay_protocol::clock::SystemClock;
use ridepay_protocol::config::{BridgeConfig, ConverterConfig, PaymentConfig};
use ridepay_protocol::crypto::{
    decode_base58, derive_shared_key, encode_base58, open_json, seal_json, BridgeKeypair,
    EncryptionPublicKey,
};
use ridepay_protocol::ledger::wire::{assemble, write_compact_u16};
use ridepay_protocol::ledger::{MemoryLedger, ParsedTransaction};
use ridepay_protocol::payment::{CreateSessionRequest, PaymentEngine};
use ridepay_protocol::pricing::{CurrencyConverter, FixedRateOracle};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!("{BG_BLUE}{BOLD}{WHITE}                                                            {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    RIDEPAY  --  One Fare, End to End                       {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    X25519 + XSalsa20-Poly1305 deep links, Ed25519 ledger   {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}                                                            {RESET}");
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]================================================{RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn truncate(s: &str, keep: usize) -> String {
    if s.len() <= keep {
        s.to_string()
    } else {
        format!("{}...", &s[..keep])
    }
}

// ---------------------------------------------------------------------------
// The rider's wallet app, played locally
// ---------------------------------------------------------------------------

struct PhoneWallet {
    encryption: BridgeKeypair,
    signer: SigningKey,
}

impl PhoneWallet {
    fn address(&self) -> String {
        encode_base58(self.signer.verifying_key().as_bytes())
    }

    fn approve_connect(&self, request: &str) -> String {
        let q = query(request);
        let dapp = EncryptionPublicKey::from_base58(&q["dapp_encryption_public_key"])
            .expect("bridge sends its key");
        let key = derive_shared_key(&self.encryption, &dapp).expect("key agreement");
        let sealed = seal_json(
            &key,
            &serde_json::json!({ "public_key": self.address(), "session": "demo-session" }),
        )
        .expect("seal");

        let mut link = Url::parse(&q["redirect_link"]).expect("redirect link");
        link.query_pairs_mut()
            .append_pair(
                WalletProvider::Phantom.profile().wallet_key_param,
                &self.encryption.public_key().to_base58(),
            )
            .append_pair("nonce", &sealed.nonce)
            .append_pair("data", &sealed.data);
        link.into()
    }

    fn approve_sign(&self, request: &str) -> String {
        let q = query(request);
        let dapp = EncryptionPublicKey::from_base58(&q["dapp_encryption_public_key"])
            .expect("bridge sends its key");
        let key = derive_shared_key(&self.encryption, &dapp).expect("key agreement");
        let body: serde_json::Value = open_json(&key, &q["nonce"], &q["payload"]).expect("open");

        let unsigned = decode_base58("transaction", body["transaction"].as_str().unwrap_or(""))
            .expect("base58 transaction");
        let message = ParsedTransaction::parse(&unsigned).expect("wire format").message;
        let signed = assemble(&[self.signer.sign(&message).to_bytes()], &message);
        let sealed = seal_json(
            &key,
            &serde_json::json!({ "transaction": encode_base58(&signed) }),
        )
        .expect("seal");

        let mut link = Url::parse(&q["redirect_link"]).expect("redirect link");
        link.query_pairs_mut()
            .append_pair("nonce", &sealed.nonce)
            .append_pair("data", &sealed.data);
        link.into()
    }

    fn unsigned_transfer(&self, to: &str) -> Vec<u8> {
        let to = decode_base58("address", to).expect("receiving address");
        let mut message = vec![1, 0, 1];
        write_compact_u16(3, &mut message);
        message.extend_from_slice(self.signer.verifying_key().as_bytes());
        message.extend_from_slice(&to);
        message.extend_from_slice(&[0u8; 32]);
        message.extend_from_slice(&[7u8; 32]);
        assemble(&[[0u8; 64]], &message)
    }
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    banner();

    let ledger = Arc::new(MemoryLedger::new());
    let converter = CurrencyConverter::new(
        Arc::new(FixedRateOracle::new(12_500.0)),
        ConverterConfig::default(),
    );
    let engine = PaymentEngine::new(
        PaymentConfig::default(),
        converter,
        ledger.clone(),
        Arc::new(SystemClock),
    )
    .expect("default config is valid");

    // -- 1 -------------------------------------------------------------------
    section(1, "Rider accepts a 750 INR bid; the engine quotes it in SOL");
    let t = Instant::now();
    let created = engine
        .create_session(CreateSessionRequest {
            user_id: "rider-ana".into(),
            fiat_amount: 750.0,
            ride_id: "ride-2718".into(),
            bid_id: "bid-31".into(),
        })
        .await
        .expect("valid fare");
    timing("quote + session", t.elapsed());
    info("Session", &created.session.transaction_id);
    info("Amount", &created.session.ledger_amount.to_string());
    info("Rate", &format!("{} INR/SOL ({:?})", created.exchange_rate, created.rate_source));
    info("Pay to", &created.receiving_address);
    info("Window", &format!("{} s", created.time_window_secs));

    // -- 2 -------------------------------------------------------------------
    section(2, "Pairing Phantom over an encrypted deep link");
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let phantom = WalletBridgeSession::new(
        WalletProvider::Phantom,
        BridgeConfig::default(),
        dispatcher,
        ledger.clone(),
        None,
    )
    .expect("bridge");
    let router = DeepLinkRouter::new(vec![phantom.clone()]);
    let wallet = PhoneWallet {
        encryption: BridgeKeypair::generate(),
        signer: SigningKey::generate(&mut OsRng),
    };

    let request = phantom.connect().await.expect("connect link");
    info("Opened", &truncate(&request.url, 64));
    let routed = router
        .route(&wallet.approve_connect(&request.url))
        .await
        .expect("callback routes");
    if let Ok(CallbackOutcome::Connected { address }) = routed.outcome {
        success(&format!("Connected to {}", truncate(&address, 16)));
    }
    info("State", &phantom.connection_state().to_string());

    // -- 3 -------------------------------------------------------------------
    section(3, "Wallet signs the transfer; the bridge broadcasts it");
    let t = Instant::now();
    let sign = phantom
        .sign_transaction(&wallet.unsigned_transfer(&created.receiving_address))
        .await
        .expect("sign link");
    let routed = router
        .route(&wallet.approve_sign(&sign.url))
        .await
        .expect("callback routes");
    timing("sign round trip", t.elapsed());
    match routed.outcome {
        Ok(CallbackOutcome::Signed(outcome)) => {
            success(&format!("Broadcast {}", truncate(&outcome.signature, 24)));
        }
        other => println!("  unexpected outcome: {other:?}"),
    }

    // -- 4 -------------------------------------------------------------------
    section(4, "Ledger settles; the engine matches the payment");
    // The memory ledger records broadcasts but doesn't execute them.
    ledger.post_transfer(
        &wallet.address(),
        &created.receiving_address,
        created.session.ledger_amount,
        chrono::Utc::now(),
    );
    let t = Instant::now();
    let verified = engine.verify_now(&created.session.transaction_id).await;
    timing("verification", t.elapsed());

    let report = engine.get_status(&created.session.transaction_id);
    if verified {
        success(&format!("Session {}", report.status));
        if let Some(hash) = &report.transaction_hash {
            info("Ledger tx", &truncate(hash, 24));
        }
    } else {
        println!("  payment not found (status {})", report.status);
    }

    engine.shutdown();
    println!();
}
