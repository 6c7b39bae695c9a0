//! Blocks, block headers, and the authority signatures they collect.
//!
//! A block's identity hash covers its header and transaction snapshots but
//! not its validator map. Authorities keep adding signatures to a block while
//! it circulates; with the map excluded every copy of the block keeps the same
//! hash, which is what the ledger uses to recognize a block it already holds.
//! Forged or stripped signatures are caught by quorum verification instead.

use crate::crypto::{Keypair, PublicKey, Signature};
use crate::hash::{hash_canonical, Hash};
use crate::node_id::NodeId;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Linkage and ordering metadata of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Sequence number (0 for genesis).
    pub index: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Hash of the previous block.
    pub previous_hash: Hash,
}

impl BlockHeader {
    /// Current Unix time in milliseconds.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// A batch of transaction snapshots with its collected authority signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Owned copies of the included transactions, frozen at inclusion.
    pub transactions: Vec<Transaction>,
    /// Authority id -> signature over [`Block::summary`].
    pub validators: BTreeMap<NodeId, Signature>,
    /// Identity hash; see the module docs for what it covers.
    pub hash: Hash,
}

#[derive(Serialize)]
struct CanonicalBlock<'a> {
    header: &'a BlockHeader,
    transactions: &'a [Transaction],
}

impl Block {
    /// Create a block stamped with the current time.
    pub fn new(index: u64, previous_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self::with_timestamp(
            index,
            BlockHeader::current_timestamp(),
            previous_hash,
            transactions,
        )
    }

    /// Create a block with an explicit timestamp.
    pub fn with_timestamp(
        index: u64,
        timestamp: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            header: BlockHeader {
                index,
                timestamp,
                previous_hash,
            },
            transactions,
            validators: BTreeMap::new(),
            hash: Hash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The canonical genesis block. Identical on every node.
    pub fn genesis() -> Self {
        Self::with_timestamp(0, 0, Hash::ZERO, Vec::new())
    }

    /// Height of this block.
    pub fn index(&self) -> u64 {
        self.header.index
    }

    /// Hash of the parent block.
    pub fn previous_hash(&self) -> Hash {
        self.header.previous_hash
    }

    /// Check if this is the height-0 block.
    pub fn is_genesis(&self) -> bool {
        self.header.index == 0 && self.header.previous_hash == Hash::ZERO
    }

    /// Number of included transactions.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Recompute the identity hash from the current content.
    pub fn compute_hash(&self) -> Hash {
        hash_canonical(&CanonicalBlock {
            header: &self.header,
            transactions: &self.transactions,
        })
    }

    /// The string authorities sign: `index‖timestamp‖tx_count‖previous_hash`.
    ///
    /// Deliberately excludes the transaction payload.
    pub fn summary(&self) -> String {
        format!(
            "{}{}{}{}",
            self.header.index,
            self.header.timestamp,
            self.transactions.len(),
            self.header.previous_hash.to_hex()
        )
    }

    /// Sign the summary as `authority` and record the signature.
    pub fn sign(&mut self, authority: NodeId, keypair: &Keypair) -> Signature {
        let signature = keypair.sign(self.summary().as_bytes());
        self.validators.insert(authority, signature.clone());
        signature
    }

    /// Record a signature produced elsewhere. Replaces an earlier one.
    pub fn add_signature(&mut self, authority: NodeId, signature: Signature) {
        self.validators.insert(authority, signature);
    }

    /// Whether `authority`'s recorded signature verifies under `public_key`.
    pub fn verify_signature_of(&self, authority: &NodeId, public_key: &PublicKey) -> bool {
        self.validators
            .get(authority)
            .is_some_and(|sig| public_key.verify(self.summary().as_bytes(), sig).is_ok())
    }

    /// Whether a transaction with this content hash is included.
    pub fn contains_transaction(&self, tx_hash: &Hash) -> bool {
        self.transactions.iter().any(|tx| tx.hash == *tx_hash)
    }
}
