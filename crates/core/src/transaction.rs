//! Transfer transactions and the signing capability that produces them.

use crate::crypto::{Address, Keypair, PublicKey, Signature};
use crate::hash::{hash_canonical, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when checking a transaction on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("sender address does not encode a public key")]
    MalformedSender,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("content hash mismatch (stored {stored}, computed {computed})")]
    HashMismatch { stored: Hash, computed: Hash },
}

/// Anything able to authorize a transfer on behalf of `address()`.
///
/// The ledger never signs client transfers itself; it only verifies them.
pub trait Signer {
    /// The address transfers are signed for.
    fn address(&self) -> Address;

    /// Sign the transfer message `sender‖recipient‖amount`.
    fn sign_transfer(&self, sender: &Address, recipient: &Address, amount: u64) -> Signature;
}

impl Signer for Keypair {
    fn address(&self) -> Address {
        Keypair::address(self)
    }

    fn sign_transfer(&self, sender: &Address, recipient: &Address, amount: u64) -> Signature {
        self.sign(&Transaction::signing_message(sender, recipient, amount))
    }
}

/// A signed value transfer.
///
/// `hash` is fixed at construction. Fields stay public so a received
/// transaction can be inspected, but any edit leaves `hash` stale and the
/// transaction fails validation from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub signature: Signature,
    pub hash: Hash,
}

/// The hashed part of a transaction.
#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    sender: &'a Address,
    recipient: &'a Address,
    amount: u64,
    signature: &'a Signature,
}

impl Transaction {
    /// Build a transaction from already-signed parts and hash it.
    pub fn new(sender: Address, recipient: Address, amount: u64, signature: Signature) -> Self {
        let mut tx = Self {
            sender,
            recipient,
            amount,
            signature,
            hash: Hash::ZERO,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// Create a transfer from `signer` to `recipient`, signed.
    pub fn signed(signer: &impl Signer, recipient: Address, amount: u64) -> Self {
        let sender = signer.address();
        let signature = signer.sign_transfer(&sender, &recipient, amount);
        Self::new(sender, recipient, amount, signature)
    }

    /// The byte string a sender signs: `sender‖recipient‖amount`.
    pub fn signing_message(sender: &Address, recipient: &Address, amount: u64) -> Vec<u8> {
        format!("{}{}{}", sender, recipient, amount).into_bytes()
    }

    /// Digest of the canonical `{sender, recipient, amount, signature}` form.
    pub fn compute_hash(&self) -> Hash {
        hash_canonical(&CanonicalTransaction {
            sender: &self.sender,
            recipient: &self.recipient,
            amount: self.amount,
            signature: &self.signature,
        })
    }

    /// Check that the stored hash still matches the content.
    pub fn verify_hash(&self) -> Result<(), TransactionError> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(TransactionError::HashMismatch {
                stored: self.hash,
                computed,
            });
        }
        Ok(())
    }

    /// Check the signature against an explicit public key.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        let message = Self::signing_message(&self.sender, &self.recipient, self.amount);
        public_key.verify(&message, &self.signature).is_ok()
    }

    /// Check the signature against the key recovered from the sender address.
    pub fn verify_sender_signature(&self) -> Result<(), TransactionError> {
        let public_key = self
            .sender
            .public_key()
            .map_err(|_| TransactionError::MalformedSender)?;
        if !self.verify_signature(&public_key) {
            return Err(TransactionError::VerificationFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(amount: u64) -> (Keypair, Transaction) {
        let keypair = Keypair::generate();
        let recipient = Keypair::generate().address();
        let tx = Transaction::signed(&keypair, recipient, amount);
        (keypair, tx)
    }

    #[test]
    fn test_signed_transaction_verifies() {
        let (keypair, tx) = transfer(30);
        assert_eq!(tx.sender, keypair.address());
        assert!(tx.verify_signature(&keypair.public_key));
        assert!(tx.verify_sender_signature().is_ok());
        assert!(tx.verify_hash().is_ok());
    }

    #[test]
    fn test_hash_fixed_at_construction() {
        let (_, tx) = transfer(30);
        assert_eq!(tx.hash, tx.compute_hash());
        assert_ne!(tx.hash, Hash::ZERO);
    }

    #[test]
    fn test_amount_tamper_detected() {
        let (keypair, mut tx) = transfer(30);
        tx.amount = 3_000;

        assert!(!tx.verify_signature(&keypair.public_key));
        assert_eq!(
            tx.verify_sender_signature(),
            Err(TransactionError::VerificationFailed)
        );
        assert!(matches!(
            tx.verify_hash(),
            Err(TransactionError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_, tx) = transfer(5);
        let other = Keypair::generate();
        assert!(!tx.verify_signature(&other.public_key));
    }

    #[test]
    fn test_malformed_sender_fails_closed() {
        let recipient = Address::from("bob");
        let tx = Transaction::new(
            Address::from("alice"),
            recipient,
            1,
            Signature::from_bytes(vec![0u8; 64]),
        );
        assert_eq!(
            tx.verify_sender_signature(),
            Err(TransactionError::MalformedSender)
        );
    }

    #[test]
    fn test_malformed_signature_fails_closed() {
        let keypair = Keypair::generate();
        let tx = Transaction::new(
            keypair.address(),
            Address::from("bob"),
            1,
            Signature::from_bytes(vec![0xde, 0xad]),
        );
        assert!(!tx.verify_signature(&keypair.public_key));
        assert!(tx.verify_sender_signature().is_err());
    }

    #[test]
    fn test_signing_message_layout() {
        let message =
            Transaction::signing_message(&Address::from("aa"), &Address::from("bb"), 42);
        assert_eq!(message, b"aabb42".to_vec());
    }
}
