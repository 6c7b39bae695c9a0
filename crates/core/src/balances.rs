//! Per-node balance table.
//!
//! Every node simulates the ledger's account balances locally. Block deltas
//! are applied atomically and at most once per block hash, so redelivering a
//! block can never double-apply its transfers.

use crate::crypto::Address;
use crate::hash::Hash;
use crate::transaction::Transaction;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors that can occur when moving balance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    #[error("insufficient balance for {address} (required {required}, available {available})")]
    InsufficientBalance {
        address: Address,
        required: u64,
        available: u64,
    },

    #[error("balance of {address} would overflow (balance {balance}, credit {amount})")]
    Overflow {
        address: Address,
        balance: u64,
        amount: u64,
    },
}

pub type Result<T> = std::result::Result<T, BalanceError>;

/// Address -> balance, plus the set of block hashes already applied.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    accounts: BTreeMap<Address, u64>,
    applied_blocks: HashSet<Hash>,
}

impl Balances {
    /// Create an empty balance table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an account's balance (genesis allocation).
    pub fn set(&mut self, address: Address, amount: u64) {
        self.accounts.insert(address, amount);
    }

    /// Balance of an existing account.
    pub fn get(&self, address: &Address) -> Option<u64> {
        self.accounts.get(address).copied()
    }

    /// Balance of an account, 0 when it has never been seen.
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.get(address).unwrap_or(0)
    }

    /// Whether the account has ever been funded or credited.
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Add to an account, creating it at 0 if absent.
    ///
    /// Fails without changing the balance if the result would not fit in a
    /// `u64`.
    pub fn credit(&mut self, address: &Address, amount: u64) -> Result<()> {
        let balance = self.accounts.entry(address.clone()).or_insert(0);
        let current = *balance;
        *balance = current
            .checked_add(amount)
            .ok_or_else(|| BalanceError::Overflow {
                address: address.clone(),
                balance: current,
                amount,
            })?;
        Ok(())
    }

    /// Subtract from an existing account.
    pub fn debit(&mut self, address: &Address, amount: u64) -> Result<()> {
        let balance = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| BalanceError::UnknownAccount(address.clone()))?;
        if *balance < amount {
            return Err(BalanceError::InsufficientBalance {
                address: address.clone(),
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    /// Move `tx.amount` from sender to recipient. On error neither account
    /// changes.
    pub fn apply_transfer(&mut self, tx: &Transaction) -> Result<()> {
        self.debit(&tx.sender, tx.amount)?;
        if let Err(err) = self.credit(&tx.recipient, tx.amount) {
            // Undo the debit; the sender held this amount a moment ago.
            if let Some(balance) = self.accounts.get_mut(&tx.sender) {
                *balance += tx.amount;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Apply every transfer in order to a copy and return the copy.
    ///
    /// `self` is left untouched whether or not the simulation succeeds.
    pub fn simulate(&self, transactions: &[Transaction]) -> Result<Balances> {
        let mut scratch = self.clone();
        for tx in transactions {
            scratch.apply_transfer(tx)?;
        }
        Ok(scratch)
    }

    /// Apply a block's transfers exactly once.
    ///
    /// Returns `Ok(false)` without touching any balance when `block_hash` was
    /// applied before. A failing transfer leaves every balance unchanged.
    pub fn apply_block(&mut self, block_hash: Hash, transactions: &[Transaction]) -> Result<bool> {
        if self.is_applied(&block_hash) {
            return Ok(false);
        }
        let updated = self.simulate(transactions)?;
        self.accounts = updated.accounts;
        self.applied_blocks.insert(block_hash);
        Ok(true)
    }

    /// Whether `block_hash`'s deltas have been applied.
    pub fn is_applied(&self, block_hash: &Hash) -> bool {
        self.applied_blocks.contains(block_hash)
    }

    /// Sum of every balance.
    pub fn total(&self) -> u128 {
        self.accounts.values().map(|&b| u128::from(b)).sum()
    }

    /// Number of known accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no account is known.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
