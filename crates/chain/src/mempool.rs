//! Pending-transaction pool.
//!
//! Transactions are deduplicated by content hash and kept in arrival order,
//! which is the order an authority packs them into its next block.

use poanet_core::{Block, Hash, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of pending transactions.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool.
#[derive(Debug, Clone)]
pub struct Mempool {
    config: MempoolConfig,
    /// Transactions indexed by hash.
    transactions: HashMap<Hash, Transaction>,
    /// Arrival order.
    order: VecDeque<Hash>,
}

impl Mempool {
    /// Create a mempool with the default capacity.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Get the number of pending transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check if a transaction with this hash is pending.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.transactions.contains_key(tx_hash)
    }

    /// Get a pending transaction by hash.
    pub fn get(&self, tx_hash: &Hash) -> Option<&Transaction> {
        self.transactions.get(tx_hash)
    }

    /// Add a transaction, keyed by its stored hash.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        if self.contains(&tx.hash) {
            return Err(MempoolError::DuplicateTransaction);
        }
        if self.transactions.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }
        self.order.push_back(tx.hash);
        self.transactions.insert(tx.hash, tx);
        Ok(())
    }

    /// Drop every pending transaction that `block` includes. Returns how many
    /// were dropped.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        let before = self.len();
        self.transactions
            .retain(|hash, _| !block.contains_transaction(hash));
        let transactions = &self.transactions;
        self.order.retain(|hash| transactions.contains_key(hash));
        before - self.len()
    }

    /// Pending transactions in arrival order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|hash| self.transactions.get(hash).cloned())
            .collect()
    }

    /// Occupancy against the configured capacity.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            total_transactions: self.len(),
            capacity: self.config.max_transactions,
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolStats {
    pub total_transactions: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use poanet_core::{Address, Keypair};

    fn transfer(amount: u64) -> Transaction {
        let keypair = Keypair::generate();
        Transaction::signed(&keypair, Address::from("bob"), amount)
    }

    #[test]
    fn test_mempool_add_and_get() {
        let mut mempool = Mempool::new();
        let tx = transfer(10);

        assert!(mempool.add(tx.clone()).is_ok());
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&tx.hash));
        assert_eq!(mempool.get(&tx.hash).unwrap(), &tx);
    }

    #[test]
    fn test_mempool_duplicate_rejected() {
        let mut mempool = Mempool::new();
        let tx = transfer(10);

        mempool.add(tx.clone()).unwrap();
        assert_eq!(mempool.add(tx), Err(MempoolError::DuplicateTransaction));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_mempool_snapshot_keeps_arrival_order() {
        let mut mempool = Mempool::new();
        let txs: Vec<_> = (1..=4).map(transfer).collect();
        for tx in &txs {
            mempool.add(tx.clone()).unwrap();
        }
        assert_eq!(mempool.snapshot(), txs);
    }

    #[test]
    fn test_mempool_remove_included() {
        let mut mempool = Mempool::new();
        let included = transfer(1);
        let pending = transfer(2);
        mempool.add(included.clone()).unwrap();
        mempool.add(pending.clone()).unwrap();

        let block = Block::new(1, Hash::ZERO, vec![included]);
        assert_eq!(mempool.remove_included(&block), 1);
        assert_eq!(mempool.snapshot(), vec![pending]);
    }

    #[test]
    fn test_mempool_capacity_limit() {
        let mut mempool = Mempool::with_config(MempoolConfig {
            max_transactions: 2,
        });

        assert!(mempool.add(transfer(1)).is_ok());
        assert!(mempool.add(transfer(2)).is_ok());
        assert_eq!(mempool.add(transfer(3)), Err(MempoolError::MempoolFull(2)));
    }

    #[test]
    fn test_mempool_stats() {
        let mut mempool = Mempool::new();
        mempool.add(transfer(1)).unwrap();
        assert_eq!(
            mempool.stats(),
            MempoolStats {
                total_transactions: 1,
                capacity: 10_000
            }
        );
    }
}
