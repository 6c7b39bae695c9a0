//! Transaction and block validation rules.
//!
//! Validation never mutates node state. Block validation replays every
//! transfer against a copy of the balance table, so a block is either valid
//! as a whole or rejected as a whole.

use poanet_core::{Address, BalanceError, Balances, Block, Hash, Transaction, TransactionError};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sender address is not a valid public key encoding")]
    MalformedSender,

    #[error("transaction signature verification failed")]
    InvalidSignature,

    #[error("transaction hash mismatch")]
    TransactionHashMismatch,

    #[error("unknown sender {0}")]
    UnknownSender(Address),

    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("duplicate transaction {0:?} in block")]
    DuplicateTransaction(Hash),

    #[error("transaction {index} in block is invalid: {source}")]
    InvalidBlockTransaction {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("transaction {index} cannot be applied: {source}")]
    Overdraft {
        index: usize,
        #[source]
        source: BalanceError,
    },
}

impl From<TransactionError> for ValidationError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::MalformedSender => ValidationError::MalformedSender,
            TransactionError::VerificationFailed => ValidationError::InvalidSignature,
            TransactionError::HashMismatch { .. } => ValidationError::TransactionHashMismatch,
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Signature over `sender‖recipient‖amount` against the key recovered from
    /// the sender address. Malformed encodings fail closed.
    pub fn validate_signature(tx: &Transaction) -> Result<()> {
        tx.verify_sender_signature()?;
        Ok(())
    }

    /// Stored content hash matches the content.
    pub fn validate_integrity(tx: &Transaction) -> Result<()> {
        tx.verify_hash()?;
        Ok(())
    }

    /// Sender exists and holds at least `amount`.
    pub fn validate_against_balances(tx: &Transaction, balances: &Balances) -> Result<()> {
        let available = balances
            .get(&tx.sender)
            .ok_or_else(|| ValidationError::UnknownSender(tx.sender.clone()))?;
        if available < tx.amount {
            return Err(ValidationError::InsufficientBalance {
                required: tx.amount,
                available,
            });
        }
        Ok(())
    }

    /// Signature, then integrity, then balance.
    pub fn validate_full(tx: &Transaction, balances: &Balances) -> Result<()> {
        Self::validate_signature(tx)?;
        Self::validate_integrity(tx)?;
        Self::validate_against_balances(tx, balances)?;
        Ok(())
    }
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Reject blocks that include the same transaction twice.
    pub fn validate_block_structure(block: &Block) -> Result<()> {
        let mut seen = HashSet::new();
        for tx in &block.transactions {
            if !seen.insert(tx.hash) {
                return Err(ValidationError::DuplicateTransaction(tx.hash));
            }
        }
        Ok(())
    }

    /// Full re-simulation of a block against `balances`.
    ///
    /// Each transaction must pass [`TransactionValidator::validate_full`]
    /// against the current table and must not overdraw the running
    /// simulation. Returns the balances the block would leave behind;
    /// `balances` itself is not modified.
    pub fn validate_block(block: &Block, balances: &Balances) -> Result<Balances> {
        Self::validate_block_structure(block)?;

        let mut simulated = balances.clone();
        for (index, tx) in block.transactions.iter().enumerate() {
            TransactionValidator::validate_full(tx, balances).map_err(|source| {
                ValidationError::InvalidBlockTransaction {
                    index,
                    source: Box::new(source),
                }
            })?;
            simulated
                .apply_transfer(tx)
                .map_err(|source| ValidationError::Overdraft { index, source })?;
        }
        Ok(simulated)
    }
}
