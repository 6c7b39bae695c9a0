//! Validating nodes and their authority capability.
//!
//! There is a single [`Node`] type. Every node validates and relays
//! transactions and blocks; a node whose [`Role`] is `Authority` can also be
//! borrowed as an [`Authority`] handle, which is the only way to reach the
//! block-production operations.

use crate::ledger::{Ledger, LedgerError};
use crate::mempool::{Mempool, MempoolConfig, MempoolError};
use poanet_consensus::{
    AuthoritySet, BlockProposer, BlockValidator, ConsensusError, PoAConfig, TransactionValidator,
    ValidationError,
};
use poanet_core::{
    Address, BalanceError, Balances, Block, Hash, Keypair, NodeId, PublicKey, Signature,
    Transaction,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during node operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("mempool error: {0}")]
    Mempool(#[from] MempoolError),

    #[error("balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("block {0:?} already in ledger")]
    DuplicateBlock(Hash),

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("node {0} is not an authority")]
    NotAnAuthority(NodeId),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub consensus: PoAConfig,
    pub mempool: MempoolConfig,
}

/// What a node is allowed to do.
#[derive(Debug, Clone)]
pub enum Role {
    /// Validates, stores, and relays.
    Validator,
    /// Additionally proposes and co-signs blocks.
    Authority(BlockProposer),
}

/// State shared by both roles.
#[derive(Debug, Clone)]
struct NodeState {
    ledger: Ledger,
    mempool: Mempool,
    balances: Balances,
    authorities: AuthoritySet,
}

impl NodeState {
    fn new(mempool: &MempoolConfig) -> Self {
        Self {
            ledger: Ledger::new(),
            mempool: Mempool::with_config(mempool.clone()),
            balances: Balances::new(),
            authorities: AuthoritySet::new(),
        }
    }

    /// Signature, content hash, and balance checks against this state.
    fn validate_transaction(&self, tx: &Transaction) -> std::result::Result<(), ValidationError> {
        TransactionValidator::validate_full(tx, &self.balances)
    }

    /// Validate and pool a transaction. `Ok(false)` when it was already
    /// pending.
    fn admit_transaction(&mut self, tx: &Transaction) -> Result<bool> {
        self.validate_transaction(tx)?;
        match self.mempool.add(tx.clone()) {
            Ok(()) => Ok(true),
            Err(MempoolError::DuplicateTransaction) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Append a block and apply its effects as one unit.
    ///
    /// Linkage and balance deltas are both checked before anything changes,
    /// so a failing block leaves ledger, balances and mempool untouched.
    fn commit(&mut self, block: &Block) -> Result<()> {
        self.ledger.check_extends(block)?;
        self.balances
            .apply_block(block.compute_hash(), &block.transactions)?;
        self.mempool.remove_included(block);
        self.ledger.append(block.clone())?;
        Ok(())
    }
}

/// A validating node.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    role: Role,
    /// Directed gossip edges. May form cycles.
    neighbors: Vec<NodeId>,
    state: NodeState,
}

impl Node {
    /// A plain validating node.
    pub fn validator(id: NodeId, config: &NodeConfig) -> Self {
        Self {
            id,
            role: Role::Validator,
            neighbors: Vec::new(),
            state: NodeState::new(&config.mempool),
        }
    }

    /// A node with block-production rights, signing with `keypair`.
    pub fn authority(id: NodeId, keypair: Keypair, config: &NodeConfig) -> Self {
        let proposer = BlockProposer::new(id.clone(), keypair);
        Self {
            role: Role::Authority(proposer),
            ..Self::validator(id, config)
        }
    }

    /// This node's identifier.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether this node holds block-production rights.
    pub fn is_authority(&self) -> bool {
        matches!(self.role, Role::Authority(_))
    }

    /// The public key this node signs blocks with, if it is an authority.
    pub fn authority_key(&self) -> Option<&PublicKey> {
        match &self.role {
            Role::Authority(proposer) => Some(proposer.public_key()),
            Role::Validator => None,
        }
    }

    /// Nodes this one relays to.
    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    /// Add a gossip edge from this node to `neighbor`.
    pub fn add_neighbor(&mut self, neighbor: NodeId) {
        if !self.neighbors.contains(&neighbor) {
            self.neighbors.push(neighbor);
        }
    }

    /// Learn an authority's public key.
    pub fn register_authority(&mut self, id: NodeId, public_key: PublicKey) {
        self.state.authorities.register(id, public_key);
    }

    /// The authority registry used for quorum checks.
    pub fn authorities(&self) -> &AuthoritySet {
        &self.state.authorities
    }

    /// Set an account's starting balance.
    pub fn fund(&mut self, address: Address, amount: u64) {
        self.state.balances.set(address, amount);
    }

    /// This node's copy of the chain.
    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// Transactions waiting for a block.
    pub fn mempool(&self) -> &Mempool {
        &self.state.mempool
    }

    /// This node's balance table.
    pub fn balances(&self) -> &Balances {
        &self.state.balances
    }

    /// Number of blocks held, genesis included.
    pub fn chain_length(&self) -> usize {
        self.state.ledger.len()
    }

    /// Hash of the chain tip.
    pub fn last_block_hash(&self) -> Hash {
        self.state.ledger.last_hash()
    }

    /// Balance of `address` as this node sees it.
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.state.balances.balance_of(address)
    }

    /// Signature, content hash, and balance checks against this node's
    /// state. The same checks gate submission and gossip.
    pub fn validate_transaction(&self, tx: &Transaction) -> std::result::Result<(), ValidationError> {
        self.state.validate_transaction(tx)
    }

    /// Accept a transaction from a client.
    ///
    /// Returns the index the next block will carry. Resubmitting a pending
    /// transaction is a no-op that still succeeds. Relaying to authorities is
    /// the network's job.
    pub fn submit_transaction(&mut self, tx: &Transaction) -> Result<u64> {
        match self.state.admit_transaction(tx) {
            Ok(added) => {
                debug!(node = %self.id, tx = %tx.hash.short(), added, "transaction submitted");
                Ok(self.state.ledger.next_index())
            }
            Err(err) => {
                debug!(node = %self.id, tx = %tx.hash.short(), %err, "transaction rejected");
                Err(err)
            }
        }
    }

    /// Gossip entry point for transactions. Returns whether the transaction
    /// was new and valid; repeated deliveries are no-ops.
    pub fn receive_transaction(&mut self, tx: &Transaction) -> bool {
        match self.state.admit_transaction(tx) {
            Ok(added) => added,
            Err(err) => {
                debug!(node = %self.id, tx = %tx.hash.short(), %err, "gossiped transaction dropped");
                false
            }
        }
    }

    /// Gossip entry point for finalized blocks.
    ///
    /// Rejects blocks already in the ledger, then requires a quorum of valid
    /// authority signatures before committing. On `Ok` the caller relays the
    /// block to this node's neighbors.
    pub fn receive_block(&mut self, block: &Block) -> Result<()> {
        if self.state.ledger.contains(block) {
            return Err(NodeError::DuplicateBlock(block.hash));
        }
        self.state.authorities.verify_quorum(block)?;
        self.state.commit(block)?;
        info!(
            node = %self.id,
            index = block.index(),
            block = %block.hash.short(),
            txs = block.tx_count(),
            "block accepted"
        );
        Ok(())
    }

    /// Borrow the block-production capability. `None` for plain validators.
    pub fn as_authority(&mut self) -> Option<Authority<'_>> {
        match &self.role {
            Role::Authority(proposer) => Some(Authority {
                proposer,
                state: &mut self.state,
            }),
            Role::Validator => None,
        }
    }
}

/// Block-production operations of an authority node.
pub struct Authority<'a> {
    proposer: &'a BlockProposer,
    state: &'a mut NodeState,
}

impl Authority<'_> {
    /// The authority's node identifier.
    pub fn id(&self) -> &NodeId {
        self.proposer.id()
    }

    /// The balance key production rewards are credited to.
    pub fn reward_address(&self) -> Address {
        self.proposer.reward_address()
    }

    /// Build, validate, and sign a candidate block from the whole mempool.
    ///
    /// `Ok(None)` when the mempool is empty. The candidate is validated by
    /// replaying every transaction against a copy of this node's balances;
    /// any failure rejects it whole. Nothing is committed here.
    pub fn propose(&self) -> std::result::Result<Option<Block>, ValidationError> {
        if self.state.mempool.is_empty() {
            return Ok(None);
        }
        let mut block = self.proposer.propose_block(
            self.state.ledger.next_index(),
            self.state.ledger.last_hash(),
            self.state.mempool.snapshot(),
        );
        BlockValidator::validate_block(&block, &self.state.balances)?;
        self.proposer.sign(&mut block);
        debug!(
            authority = %self.id(),
            index = block.index(),
            block = %block.hash.short(),
            txs = block.tx_count(),
            "candidate block signed"
        );
        Ok(Some(block))
    }

    /// Independently validate a peer's candidate against this node's own
    /// state and, if it holds, return this authority's signature over it.
    pub fn endorse(&self, block: &Block) -> Result<Signature> {
        if self.state.ledger.contains(block) {
            return Err(NodeError::DuplicateBlock(block.hash));
        }
        self.state.ledger.check_extends(block)?;
        BlockValidator::validate_block(block, &self.state.balances)?;
        Ok(self.proposer.signature_for(block))
    }

    /// Append a block and apply its effects.
    pub fn commit(&mut self, block: &Block) -> Result<()> {
        if self.state.ledger.contains(block) {
            return Err(NodeError::DuplicateBlock(block.hash));
        }
        self.state.commit(block)
    }

    /// Credit production rewards to this authority's own balance table.
    pub fn credit_reward(&mut self, amount: u64) -> Result<()> {
        let address = self.reward_address();
        self.state.balances.credit(&address, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        authorities: Vec<(NodeId, Keypair)>,
        alice: Keypair,
        bob: Keypair,
    }

    fn fixture(n: usize) -> Fixture {
        Fixture {
            authorities: (0..n)
                .map(|i| (NodeId::new(format!("AuthorityNode-{}", i + 1)), Keypair::generate()))
                .collect(),
            alice: Keypair::generate(),
            bob: Keypair::generate(),
        }
    }

    impl Fixture {
        fn setup(&self, mut node: Node) -> Node {
            for (id, keypair) in &self.authorities {
                node.register_authority(id.clone(), keypair.public_key);
            }
            node.fund(self.alice.address(), 50);
            node.fund(self.bob.address(), 50);
            node
        }

        fn validator(&self) -> Node {
            self.setup(Node::validator(NodeId::from("Node-1"), &NodeConfig::default()))
        }

        fn authority(&self, i: usize) -> Node {
            let (id, keypair) = &self.authorities[i];
            self.setup(Node::authority(id.clone(), keypair.clone(), &NodeConfig::default()))
        }

        fn transfer(&self, amount: u64) -> Transaction {
            Transaction::signed(&self.alice, self.bob.address(), amount)
        }
    }

    fn sign_by(block: &mut Block, fx: &Fixture, signers: &[usize]) {
        for &i in signers {
            let (id, keypair) = &fx.authorities[i];
            block.sign(id.clone(), keypair);
        }
    }

    #[test]
    fn test_submit_returns_next_index() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let tx = fx.transfer(30);

        assert_eq!(node.submit_transaction(&tx), Ok(1));
        assert_eq!(node.submit_transaction(&tx), Ok(1));
        assert_eq!(node.mempool().len(), 1);
    }

    #[test]
    fn test_submit_rejects_invalid() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let mut tx = fx.transfer(30);
        tx.amount = 40;

        assert!(matches!(
            node.submit_transaction(&tx),
            Err(NodeError::Validation(ValidationError::InvalidSignature))
        ));
        assert!(node.mempool().is_empty());
    }

    #[test]
    fn test_receive_transaction_idempotent() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let tx = fx.transfer(30);

        assert!(node.receive_transaction(&tx));
        assert!(!node.receive_transaction(&tx));
        assert_eq!(node.mempool().len(), 1);
        assert!(!node.receive_transaction(&fx.transfer(51)));
    }

    #[test]
    fn test_receive_block_quorum_threshold() {
        let fx = fixture(3);
        let tx = fx.transfer(30);

        let mut one_of_three = Block::new(1, Block::genesis().hash, vec![tx.clone()]);
        sign_by(&mut one_of_three, &fx, &[0]);
        let mut node = fx.validator();
        assert!(matches!(
            node.receive_block(&one_of_three),
            Err(NodeError::Consensus(ConsensusError::QuorumNotReached { valid: 1, .. }))
        ));
        assert_eq!(node.chain_length(), 1);

        let mut two_of_three = one_of_three.clone();
        sign_by(&mut two_of_three, &fx, &[1]);
        assert!(node.receive_block(&two_of_three).is_ok());
        assert_eq!(node.chain_length(), 2);
        assert_eq!(node.balance_of(&fx.alice.address()), 20);
        assert_eq!(node.balance_of(&fx.bob.address()), 80);
    }

    #[test]
    fn test_receive_block_twice_is_noop() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let tx = fx.transfer(30);
        node.submit_transaction(&tx).unwrap();

        let mut block = Block::new(1, Block::genesis().hash, vec![tx]);
        sign_by(&mut block, &fx, &[0, 1]);

        node.receive_block(&block).unwrap();
        let balances = node.balances().total();
        assert!(node.mempool().is_empty());
        assert!(matches!(
            node.receive_block(&block),
            Err(NodeError::DuplicateBlock(_))
        ));
        assert_eq!(node.chain_length(), 2);
        assert_eq!(node.balances().total(), balances);
        assert_eq!(node.balance_of(&fx.alice.address()), 20);
    }

    #[test]
    fn test_receive_block_with_broken_link_leaves_state() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let mut block = Block::new(1, Hash::ZERO, vec![fx.transfer(30)]);
        sign_by(&mut block, &fx, &[0, 1, 2]);

        assert!(matches!(
            node.receive_block(&block),
            Err(NodeError::Ledger(LedgerError::LinkageMismatch { .. }))
        ));
        assert_eq!(node.chain_length(), 1);
        assert_eq!(node.balance_of(&fx.alice.address()), 50);
    }

    #[test]
    fn test_receive_block_overdraft_leaves_state() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let mut block = Block::new(
            1,
            Block::genesis().hash,
            vec![fx.transfer(30), Transaction::signed(&fx.alice, Address::from("carol"), 30)],
        );
        sign_by(&mut block, &fx, &[0, 1]);

        assert!(matches!(
            node.receive_block(&block),
            Err(NodeError::Balance(BalanceError::InsufficientBalance { .. }))
        ));
        assert_eq!(node.chain_length(), 1);
        assert_eq!(node.balance_of(&fx.alice.address()), 50);
    }

    #[test]
    fn test_validator_has_no_authority_capability() {
        let fx = fixture(1);
        let mut node = fx.validator();
        assert!(!node.is_authority());
        assert!(node.as_authority().is_none());
        assert!(node.authority_key().is_none());
    }

    #[test]
    fn test_propose_empty_mempool() {
        let fx = fixture(1);
        let mut node = fx.authority(0);
        let authority = node.as_authority().unwrap();
        assert_eq!(authority.propose(), Ok(None));
    }

    #[test]
    fn test_propose_signs_full_mempool() {
        let fx = fixture(3);
        let mut node = fx.authority(0);
        let tx1 = fx.transfer(30);
        let tx2 = fx.transfer(20);
        node.submit_transaction(&tx1).unwrap();
        node.submit_transaction(&tx2).unwrap();

        let authority = node.as_authority().unwrap();
        let block = authority.propose().unwrap().unwrap();
        assert_eq!(block.index(), 1);
        assert_eq!(block.previous_hash(), Block::genesis().hash);
        assert_eq!(block.transactions, vec![tx1, tx2]);
        assert_eq!(block.validators.len(), 1);
        assert!(block.validators.contains_key(&fx.authorities[0].0));

        // Proposing commits nothing.
        assert_eq!(node.chain_length(), 1);
        assert_eq!(node.mempool().len(), 2);
    }

    #[test]
    fn test_propose_rejects_overdrawing_candidate() {
        let fx = fixture(1);
        let mut node = fx.authority(0);
        // Both fit the balance on their own, not together.
        node.submit_transaction(&fx.transfer(30)).unwrap();
        node.submit_transaction(&Transaction::signed(&fx.alice, Address::from("carol"), 30))
            .unwrap();

        let authority = node.as_authority().unwrap();
        assert!(matches!(
            authority.propose(),
            Err(ValidationError::Overdraft { index: 1, .. })
        ));
        assert_eq!(node.mempool().len(), 2);
    }

    #[test]
    fn test_endorse_and_commit() {
        let fx = fixture(3);
        let mut proposer = fx.authority(0);
        let mut peer = fx.authority(1);
        proposer.submit_transaction(&fx.transfer(30)).unwrap();

        let mut block = proposer.as_authority().unwrap().propose().unwrap().unwrap();
        let peer_auth = peer.as_authority().unwrap();
        let signature = peer_auth.endorse(&block).unwrap();
        block.add_signature(peer_auth.id().clone(), signature);
        assert_eq!(peer.authorities().verify_quorum(&block), Ok(2));

        let mut peer_auth = peer.as_authority().unwrap();
        peer_auth.commit(&block).unwrap();
        assert!(matches!(
            peer_auth.endorse(&block),
            Err(NodeError::DuplicateBlock(_))
        ));
        assert_eq!(peer.chain_length(), 2);
        assert_eq!(peer.balance_of(&fx.bob.address()), 80);
    }

    #[test]
    fn test_endorse_uses_own_state() {
        let fx = fixture(3);
        let mut proposer = fx.authority(0);
        let mut peer = fx.authority(1);
        proposer.submit_transaction(&fx.transfer(30)).unwrap();
        let block = proposer.as_authority().unwrap().propose().unwrap().unwrap();

        // The peer believes alice is broke.
        peer.fund(fx.alice.address(), 10);
        let peer_auth = peer.as_authority().unwrap();
        assert!(matches!(
            peer_auth.endorse(&block),
            Err(NodeError::Validation(ValidationError::InvalidBlockTransaction { index: 0, .. }))
        ));
    }

    #[test]
    fn test_validate_transaction_matches_admission() {
        let fx = fixture(1);
        let mut node = fx.validator();
        let good = fx.transfer(50);
        let overdraw = fx.transfer(51);
        let stranger = Transaction::signed(&Keypair::generate(), fx.bob.address(), 1);

        assert_eq!(node.validate_transaction(&good), Ok(()));
        assert!(matches!(
            node.validate_transaction(&overdraw),
            Err(ValidationError::InsufficientBalance { required: 51, available: 50 })
        ));
        assert!(matches!(
            node.validate_transaction(&stranger),
            Err(ValidationError::UnknownSender(_))
        ));

        // Validation alone never touches the mempool.
        assert!(node.mempool().is_empty());
        assert!(node.receive_transaction(&good));
        assert!(!node.receive_transaction(&overdraw));
        assert!(!node.receive_transaction(&stranger));
        assert_eq!(node.mempool().len(), 1);
    }

    #[test]
    fn test_receive_block_overflowing_recipient_leaves_state() {
        let fx = fixture(3);
        let mut node = fx.validator();
        let whale = Address::from("whale");
        node.fund(whale.clone(), u64::MAX);
        let total = node.balances().total();

        let mut block = Block::new(
            1,
            Block::genesis().hash,
            vec![Transaction::signed(&fx.alice, whale.clone(), 10)],
        );
        sign_by(&mut block, &fx, &[0, 1]);

        assert!(matches!(
            node.receive_block(&block),
            Err(NodeError::Balance(BalanceError::Overflow { .. }))
        ));
        assert_eq!(node.chain_length(), 1);
        assert_eq!(node.balances().total(), total);
        assert_eq!(node.balance_of(&whale), u64::MAX);
    }

    #[test]
    fn test_reward_overflow_reported() {
        let fx = fixture(1);
        let mut node = fx.authority(0);
        let reward_address = fx.authorities[0].1.address();
        node.fund(reward_address.clone(), u64::MAX);

        let mut authority = node.as_authority().unwrap();
        assert!(matches!(
            authority.credit_reward(1),
            Err(NodeError::Balance(BalanceError::Overflow { .. }))
        ));
        assert_eq!(node.balance_of(&reward_address), u64::MAX);
    }

    #[test]
    fn test_node_config_json() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"mempool": {"max_transactions": 2}}"#).unwrap();
        assert_eq!(config.mempool.max_transactions, 2);
        assert_eq!(config.consensus, PoAConfig::default());
    }

    #[test]
    fn test_reward_keyed_by_public_key() {
        let fx = fixture(1);
        let mut node = fx.authority(0);
        let mut authority = node.as_authority().unwrap();
        let reward_address = authority.reward_address();
        authority.credit_reward(1).unwrap();
        authority.credit_reward(1).unwrap();

        assert_eq!(reward_address, fx.authorities[0].1.address());
        assert_eq!(node.balance_of(&reward_address), 2);
        assert_eq!(node.balance_of(&Address::new(fx.authorities[0].0.as_str())), 0);
    }
}
