//! Append-only, per-node view of the chain.
//!
//! Every node owns its own ledger. Nothing is shared between nodes; the
//! ledgers converge only because every node applies the same gossiped blocks.

use poanet_core::{Block, Hash};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("block does not extend the chain tip (tip {tip:?}, block previous_hash {previous_hash:?})")]
    LinkageMismatch { tip: Hash, previous_hash: Hash },

    #[error("block {height} hash does not match its content")]
    HashMismatch { height: usize },

    #[error("block {height} does not link to its parent")]
    BrokenLink { height: usize },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// An ordered chain of blocks rooted at the canonical genesis block.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    /// Hashes of every stored block, for duplicate detection.
    hashes: HashSet<Hash>,
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut hashes = HashSet::new();
        hashes.insert(genesis.hash);
        Self {
            blocks: vec![genesis],
            hashes,
        }
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: the genesis block is never removed.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index the next appended block will carry.
    pub fn next_index(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// The current tip.
    pub fn last_block(&self) -> &Block {
        // The genesis block is inserted at construction and never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Hash of the current tip.
    pub fn last_hash(&self) -> Hash {
        self.last_block().hash
    }

    /// Get a block by height.
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Whether a block with the same hash is already stored.
    pub fn contains(&self, block: &Block) -> bool {
        self.contains_hash(&block.hash)
    }

    /// Whether a block with this hash is stored.
    pub fn contains_hash(&self, hash: &Hash) -> bool {
        self.hashes.contains(hash)
    }

    /// Check that `block` links onto the current tip.
    pub fn check_extends(&self, block: &Block) -> Result<()> {
        let tip = self.last_hash();
        if block.previous_hash() != tip {
            return Err(LedgerError::LinkageMismatch {
                tip,
                previous_hash: block.previous_hash(),
            });
        }
        Ok(())
    }

    /// Append a block that links onto the tip.
    ///
    /// The block's hash is recomputed before it is stored.
    pub fn append(&mut self, mut block: Block) -> Result<&Block> {
        self.check_extends(&block)?;
        block.hash = block.compute_hash();
        self.hashes.insert(block.hash);
        self.blocks.push(block);
        Ok(self.last_block())
    }

    /// Walk the chain checking every block after genesis for hash integrity
    /// and linkage. Stops at the first violation.
    pub fn validate(&self) -> Result<()> {
        for (height, pair) in self.blocks.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let height = height + 1;
            if current.hash != current.compute_hash() {
                return Err(LedgerError::HashMismatch { height });
            }
            if current.previous_hash() != previous.hash {
                return Err(LedgerError::BrokenLink { height });
            }
        }
        Ok(())
    }

    /// Check if [`Ledger::validate`] passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
