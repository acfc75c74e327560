//! Ed25519 verification for ledger transactions.
//!
//! A wallet hands back a signed transaction; before we spend an RPC call
//! broadcasting it, we check that the fee payer's signature actually covers
//! the message. A wallet that returns garbage gets caught here instead of by
//! the cluster, thirty seconds later, with a worse error message.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::config::{LEDGER_ADDRESS_LENGTH, LEDGER_SIGNATURE_LENGTH};

/// Check `signature` over `message` against the ledger address `signer`.
///
/// Returns `false` for invalid points as well as bad signatures. We don't
/// care which; either way the transaction isn't going anywhere.
pub fn verify_ledger_signature(
    signer: &[u8; LEDGER_ADDRESS_LENGTH],
    message: &[u8],
    signature: &[u8; LEDGER_SIGNATURE_LENGTH],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(signer) else {
        return false;
    };
    let signature = Signature::from_bytes(signature);
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn test_valid_signature_verifies() {
        let signer = SigningKey::generate(&mut OsRng);
        let sig = signer.sign(b"transfer 0.05");
        assert!(verify_ledger_signature(
            signer.verifying_key().as_bytes(),
            b"transfer 0.05",
            &sig.to_bytes()
        ));
    }

    #[test]
    fn test_altered_message_fails() {
        let signer = SigningKey::generate(&mut OsRng);
        let sig = signer.sign(b"transfer 0.05");
        assert!(!verify_ledger_signature(
            signer.verifying_key().as_bytes(),
            b"transfer 5.00",
            &sig.to_bytes()
        ));
    }

    #[test]
    fn test_unsigned_placeholder_fails() {
        let signer = SigningKey::generate(&mut OsRng);
        assert!(!verify_ledger_signature(
            signer.verifying_key().as_bytes(),
            b"anything",
            &[0u8; 64]
        ));
    }
}
