//! Decrypted wallet payloads, one decoder per provider.
//!
//! | Provider | Connect                 | Sign                                   |
//! |----------|-------------------------|----------------------------------------|
//! | Phantom  | `{public_key, session}` | `{transaction}` or `{signature}`       |
//! | Solflare | `{public_key, session}` | `{transaction}` or `{signature}`       |
//! | Backpack | `{public_key, session}` | `{transaction}` or `{result:{transaction}}` |
//!
//! Each decoder normalizes to [`SignedPayload`]. A shape the provider isn't
//! known to send is an error, even if another provider would send it.

use serde::Deserialize;

use super::error::BridgeError;
use super::provider::WalletProvider;
use crate::config::LEDGER_SIGNATURE_LENGTH;
use crate::crypto::{decode_base58, decode_base58_array};

/// The decrypted connect response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectResponse {
    /// The payer's ledger address.
    pub public_key: String,
    /// Opaque token the wallet wants back on every sign request.
    pub session: String,
}

/// A sign response, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    /// Fully signed transaction bytes; we broadcast it.
    Transaction(Vec<u8>),
    /// The wallet already submitted it; this is the signature.
    Signature(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SignOrSubmit {
    Transaction { transaction: String },
    Signature { signature: String },
}

#[derive(Deserialize)]
struct NestedTransaction {
    transaction: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BackpackSign {
    Transaction { transaction: String },
    Nested { result: NestedTransaction },
}

fn transaction_bytes(encoded: &str) -> Result<SignedPayload, BridgeError> {
    Ok(SignedPayload::Transaction(decode_base58(
        "signed transaction",
        encoded,
    )?))
}

fn signature(encoded: String) -> Result<SignedPayload, BridgeError> {
    decode_base58_array::<LEDGER_SIGNATURE_LENGTH>("signature", &encoded)?;
    Ok(SignedPayload::Signature(encoded))
}

/// Decode a decrypted sign response according to `provider`'s dialect.
pub fn decode_sign_response(
    provider: WalletProvider,
    plaintext: &[u8],
) -> Result<SignedPayload, BridgeError> {
    match provider {
        WalletProvider::Phantom | WalletProvider::Solflare => {
            match serde_json::from_slice::<SignOrSubmit>(plaintext)
                .map_err(|_| BridgeError::UnrecognizedResponse)?
            {
                SignOrSubmit::Transaction { transaction } => transaction_bytes(&transaction),
                SignOrSubmit::Signature { signature: sig } => signature(sig),
            }
        }
        WalletProvider::Backpack => {
            match serde_json::from_slice::<BackpackSign>(plaintext)
                .map_err(|_| BridgeError::UnrecognizedResponse)?
            {
                BackpackSign::Transaction { transaction } => transaction_bytes(&transaction),
                BackpackSign::Nested { result } => transaction_bytes(&result.transaction),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encode_base58;

    #[test]
    fn test_transaction_shape_for_everyone() {
        let body = format!(r#"{{"transaction":"{}"}}"#, encode_base58(b"signed"));
        for provider in WalletProvider::ALL {
            assert_eq!(
                decode_sign_response(provider, body.as_bytes()).unwrap(),
                SignedPayload::Transaction(b"signed".to_vec())
            );
        }
    }

    #[test]
    fn test_bare_signature_only_where_supported() {
        let sig = encode_base58(&[5u8; 64]);
        let body = format!(r#"{{"signature":"{sig}"}}"#);
        assert_eq!(
            decode_sign_response(WalletProvider::Phantom, body.as_bytes()).unwrap(),
            SignedPayload::Signature(sig)
        );
        assert!(matches!(
            decode_sign_response(WalletProvider::Backpack, body.as_bytes()),
            Err(BridgeError::UnrecognizedResponse)
        ));
    }

    #[test]
    fn test_backpack_nested_result() {
        let body = format!(r#"{{"result":{{"transaction":"{}"}}}}"#, encode_base58(b"tx"));
        assert_eq!(
            decode_sign_response(WalletProvider::Backpack, body.as_bytes()).unwrap(),
            SignedPayload::Transaction(b"tx".to_vec())
        );
        assert!(matches!(
            decode_sign_response(WalletProvider::Solflare, body.as_bytes()),
            Err(BridgeError::UnrecognizedResponse)
        ));
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        assert!(matches!(
            decode_sign_response(WalletProvider::Phantom, br#"{"ok":true}"#),
            Err(BridgeError::UnrecognizedResponse)
        ));
    }

    #[test]
    fn test_short_signature_rejected() {
        let body = format!(r#"{{"signature":"{}"}}"#, encode_base58(&[1u8; 10]));
        assert!(matches!(
            decode_sign_response(WalletProvider::Phantom, body.as_bytes()),
            Err(BridgeError::Crypto(_))
        ));
    }
}
