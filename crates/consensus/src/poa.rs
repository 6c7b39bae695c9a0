//! Proof of Authority quorum rules.
//!
//! A fixed, known set of authorities may produce and co-sign blocks. A block
//! is final once at least half of all registered authorities have signed its
//! summary string. Authorities are identified by [`NodeId`]; their public keys
//! are registered with every node ahead of time.

use poanet_core::{Address, Block, Hash, Keypair, NodeId, PublicKey, Signature, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("no authorities configured")]
    NoAuthorities,

    #[error("unknown authority: {0}")]
    UnknownAuthority(NodeId),

    #[error("quorum not reached ({valid} valid signatures of {authorities} authorities)")]
    QuorumNotReached { valid: usize, authorities: usize },
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// When a proposer commits its own block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Proposer and endorsing peers commit only once quorum is reached. A
    /// candidate that misses quorum is abandoned and the mempool kept.
    #[default]
    AfterQuorum,
    /// Proposer commits before the quorum round and floods regardless of
    /// how many peers endorsed. Its chain may diverge when quorum fails.
    Optimistic,
}

/// Proof of Authority configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoAConfig {
    pub commit_policy: CommitPolicy,
    /// Units credited to the proposer for every peer authority that accepts
    /// its block.
    pub reward_per_endorsement: u64,
}

impl Default for PoAConfig {
    fn default() -> Self {
        Self {
            commit_policy: CommitPolicy::AfterQuorum,
            reward_per_endorsement: 1,
        }
    }
}

impl PoAConfig {
    /// Defaults with the optimistic commit policy.
    pub fn optimistic() -> Self {
        Self {
            commit_policy: CommitPolicy::Optimistic,
            ..Self::default()
        }
    }
}

/// Registry of authority public keys, and the quorum rule over them.
#[derive(Debug, Clone, Default)]
pub struct AuthoritySet {
    public_keys: BTreeMap<NodeId, PublicKey>,
}

impl AuthoritySet {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an authority's public key.
    pub fn register(&mut self, id: NodeId, public_key: PublicKey) {
        self.public_keys.insert(id, public_key);
    }

    /// The registered key for `id`, if it is an authority.
    pub fn get_public_key(&self, id: &NodeId) -> Option<&PublicKey> {
        self.public_keys.get(id)
    }

    /// Number of registered authorities.
    pub fn len(&self) -> usize {
        self.public_keys.len()
    }

    /// Check if no authority is registered.
    pub fn is_empty(&self) -> bool {
        self.public_keys.is_empty()
    }

    /// The balance key an authority's rewards are credited to: the address
    /// form of its public key, not its node id.
    pub fn reward_address(&self, id: &NodeId) -> Result<Address> {
        self.get_public_key(id)
            .map(PublicKey::to_address)
            .ok_or_else(|| ConsensusError::UnknownAuthority(id.clone()))
    }

    /// Count validator signatures that verify against the registered key of
    /// the authority they are recorded under. Unknown signers count for
    /// nothing.
    pub fn count_valid_signatures(&self, block: &Block) -> usize {
        block
            .validators
            .keys()
            .filter(|id| {
                self.get_public_key(id)
                    .is_some_and(|key| block.verify_signature_of(id, key))
            })
            .count()
    }

    /// `valid >= authorities / 2` without rounding: an odd set needs a strict
    /// majority, an even set exactly half.
    pub fn meets_threshold(&self, valid: usize) -> bool {
        !self.is_empty() && valid * 2 >= self.len()
    }

    /// Verify that `block` carries a quorum of valid authority signatures.
    pub fn verify_quorum(&self, block: &Block) -> Result<usize> {
        if self.is_empty() {
            return Err(ConsensusError::NoAuthorities);
        }
        let valid = self.count_valid_signatures(block);
        debug!(
            block = %block.hash.short(),
            valid,
            authorities = self.len(),
            "counted block signatures"
        );
        if !self.meets_threshold(valid) {
            return Err(ConsensusError::QuorumNotReached {
                valid,
                authorities: self.len(),
            });
        }
        Ok(valid)
    }
}

/// Block construction and signing for one authority.
#[derive(Debug, Clone)]
pub struct BlockProposer {
    id: NodeId,
    keypair: Keypair,
}

impl BlockProposer {
    /// A proposer signing as `id` with `keypair`.
    pub fn new(id: NodeId, keypair: Keypair) -> Self {
        Self { id, keypair }
    }

    /// The authority id signatures are recorded under.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The key validators check this proposer's signatures against.
    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public_key
    }

    /// Where this authority's production rewards accrue.
    pub fn reward_address(&self) -> Address {
        self.keypair.public_key.to_address()
    }

    /// Build an unsigned candidate block extending `previous_hash`.
    pub fn propose_block(
        &self,
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
    ) -> Block {
        Block::new(index, previous_hash, transactions)
    }

    /// This authority's signature over the block's summary, without
    /// recording it.
    pub fn signature_for(&self, block: &Block) -> Signature {
        self.keypair.sign(block.summary().as_bytes())
    }

    /// Sign the block's summary under this authority's id.
    pub fn sign(&self, block: &mut Block) -> Signature {
        block.sign(self.id.clone(), &self.keypair)
    }
}
