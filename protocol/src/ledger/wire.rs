//! Just enough of the ledger's transaction wire format to check signatures.
//!
//! ```text
//! transaction := compact_u16(n) || signature[64] * n || message
//! message     := [0x80 | version]? || header[3] || compact_u16(m) || account[32] * m || ...
//! ```
//!
//! The first account key of the message is the fee payer, and the first
//! signature is the fee payer's signature over the full message bytes. That
//! first signature, base58-encoded, is also the transaction's id.

use thiserror::Error;

use crate::config::{LEDGER_ADDRESS_LENGTH, LEDGER_SIGNATURE_LENGTH};
use crate::crypto::{encode_base58, verify_ledger_signature};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("transaction truncated")]
    Truncated,

    #[error("malformed compact-u16 length")]
    BadLength,

    #[error("transaction carries no signatures")]
    NoSignatures,
}

/// A signed transaction split into signatures and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub signatures: Vec<[u8; LEDGER_SIGNATURE_LENGTH]>,
    pub message: Vec<u8>,
    /// `None` if the message header couldn't be read.
    pub fee_payer: Option<[u8; LEDGER_ADDRESS_LENGTH]>,
}

impl ParsedTransaction {
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let (count, mut offset) = read_compact_u16(bytes)?;
        if count == 0 {
            return Err(WireError::NoSignatures);
        }

        // Bounded by what the input could actually hold.
        let room = bytes.len().saturating_sub(offset) / LEDGER_SIGNATURE_LENGTH;
        let mut signatures = Vec::with_capacity(count.min(room));
        for _ in 0..count {
            let end = offset + LEDGER_SIGNATURE_LENGTH;
            let chunk = bytes.get(offset..end).ok_or(WireError::Truncated)?;
            let mut sig = [0u8; LEDGER_SIGNATURE_LENGTH];
            sig.copy_from_slice(chunk);
            signatures.push(sig);
            offset = end;
        }

        let message = bytes[offset..].to_vec();
        let fee_payer = read_fee_payer(&message);
        Ok(Self {
            signatures,
            message,
            fee_payer,
        })
    }

    /// The transaction id: its first signature in base58.
    pub fn id(&self) -> String {
        encode_base58(&self.signatures[0])
    }

    /// Whether the fee payer's signature is valid. `None` if there's no
    /// readable fee payer to check against.
    pub fn fee_payer_signature_valid(&self) -> Option<bool> {
        let payer = self.fee_payer?;
        Some(verify_ledger_signature(
            &payer,
            &self.message,
            &self.signatures[0],
        ))
    }
}

fn read_fee_payer(message: &[u8]) -> Option<[u8; LEDGER_ADDRESS_LENGTH]> {
    // Versioned messages prefix a byte with the high bit set.
    let mut offset = match message.first()? {
        b if b & 0x80 != 0 => 1,
        _ => 0,
    };
    offset += 3; // header
    let (accounts, used) = read_compact_u16(message.get(offset..)?).ok()?;
    if accounts == 0 {
        return None;
    }
    offset += used;
    let key = message.get(offset..offset + LEDGER_ADDRESS_LENGTH)?;
    let mut out = [0u8; LEDGER_ADDRESS_LENGTH];
    out.copy_from_slice(key);
    Some(out)
}

/// Decode a compact-u16 (1-3 bytes, 7 bits per byte). Returns `(value, bytes_read)`.
fn read_compact_u16(bytes: &[u8]) -> Result<(usize, usize), WireError> {
    let mut value = 0usize;
    for i in 0..3 {
        let byte = *bytes.get(i).ok_or(WireError::Truncated)?;
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            if value > u16::MAX as usize {
                return Err(WireError::BadLength);
            }
            return Ok((value, i + 1));
        }
    }
    Err(WireError::BadLength)
}

/// Encode a compact-u16. The inverse of the reader above.
pub fn write_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Assemble `compact_u16(n) || signatures || message`.
pub fn assemble(signatures: &[[u8; LEDGER_SIGNATURE_LENGTH]], message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + signatures.len() * LEDGER_SIGNATURE_LENGTH + message.len());
    write_compact_u16(signatures.len() as u16, &mut out);
    for sig in signatures {
        out.extend_from_slice(sig);
    }
    out.extend_from_slice(message);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn message_for(payer: &[u8; 32]) -> Vec<u8> {
        let mut msg = vec![1, 0, 1]; // header
        write_compact_u16(2, &mut msg);
        msg.extend_from_slice(payer);
        msg.extend_from_slice(&[9u8; 32]);
        msg.extend_from_slice(&[0u8; 32]); // recent blockhash
        msg
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let key = SigningKey::generate(&mut OsRng);
        let msg = message_for(key.verifying_key().as_bytes());
        let sig = key.sign(&msg).to_bytes();

        let parsed = ParsedTransaction::parse(&assemble(&[sig], &msg)).unwrap();
        assert_eq!(parsed.fee_payer, Some(*key.verifying_key().as_bytes()));
        assert_eq!(parsed.fee_payer_signature_valid(), Some(true));
        assert_eq!(parsed.id(), encode_base58(&sig));
    }

    #[test]
    fn test_unsigned_placeholder_does_not_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let msg = message_for(key.verifying_key().as_bytes());
        let parsed = ParsedTransaction::parse(&assemble(&[[0u8; 64]], &msg)).unwrap();
        assert_eq!(parsed.fee_payer_signature_valid(), Some(false));
    }

    #[test]
    fn test_versioned_message_prefix() {
        let key = SigningKey::generate(&mut OsRng);
        let mut msg = vec![0x80];
        msg.extend(message_for(key.verifying_key().as_bytes()));
        let sig = key.sign(&msg).to_bytes();
        let parsed = ParsedTransaction::parse(&assemble(&[sig], &msg)).unwrap();
        assert_eq!(parsed.fee_payer_signature_valid(), Some(true));
    }

    #[test]
    fn test_truncated_and_empty() {
        assert_eq!(ParsedTransaction::parse(&[]), Err(WireError::Truncated));
        assert_eq!(ParsedTransaction::parse(&[0]), Err(WireError::NoSignatures));
        assert_eq!(ParsedTransaction::parse(&[1, 0, 0]), Err(WireError::Truncated));
    }

    #[test]
    fn test_oversized_signature_count() {
        // 2^21 - 1 doesn't fit a compact-u16.
        assert_eq!(
            ParsedTransaction::parse(&[0xff, 0xff, 0x7f]),
            Err(WireError::BadLength)
        );
        // u16::MAX fits, but three bytes can't carry that many signatures.
        assert_eq!(
            ParsedTransaction::parse(&[0xff, 0xff, 0x03]),
            Err(WireError::Truncated)
        );
    }

    #[test]
    fn test_compact_u16_multibyte() {
        let mut out = Vec::new();
        write_compact_u16(300, &mut out);
        assert_eq!(out, vec![0xac, 0x02]);
        assert_eq!(read_compact_u16(&out), Ok((300, 2)));
    }
}
