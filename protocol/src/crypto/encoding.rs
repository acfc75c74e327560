//! Base58 helpers.
//!
//! Public keys, nonces, encrypted payloads, signatures, serialized
//! transactions: if it goes into a deep link or out to the ledger, it's
//! base58 (Bitcoin alphabet). These wrappers attach a name to every decode
//! failure so the error says *which* parameter was garbage.

use super::CryptoError;
use crate::config::LEDGER_ADDRESS_LENGTH;

/// Encode bytes as base58.
pub fn encode_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode base58 into a byte vector.
pub fn decode_base58(what: &'static str, value: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(value)
        .into_vec()
        .map_err(|_| CryptoError::InvalidBase58 { what })
}

/// Decode base58 into a fixed-size array, rejecting anything of the wrong length.
pub fn decode_base58_array<const N: usize>(
    what: &'static str,
    value: &str,
) -> Result<[u8; N], CryptoError> {
    let bytes = decode_base58(what, value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what,
        expected: N,
        actual,
    })
}

/// Whether `address` looks like a ledger address: base58 of exactly 32 bytes.
pub fn is_valid_address(address: &str) -> bool {
    decode_base58_array::<LEDGER_ADDRESS_LENGTH>("address", address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECEIVING_ADDRESS;

    #[test]
    fn test_default_receiving_address_is_valid() {
        assert!(is_valid_address(DEFAULT_RECEIVING_ADDRESS));
    }

    #[test]
    fn test_rejects_non_base58_characters() {
        // '0', 'O', 'I' and 'l' aren't in the alphabet.
        assert!(!is_valid_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
        assert_eq!(
            decode_base58("nonce", "0OIl"),
            Err(CryptoError::InvalidBase58 { what: "nonce" })
        );
    }

    #[test]
    fn test_array_decode_reports_length() {
        let encoded = encode_base58(&[7u8; 10]);
        let err = decode_base58_array::<32>("public key", &encoded).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength {
                what: "public key",
                expected: 32,
                actual: 10
            }
        );
    }
}
