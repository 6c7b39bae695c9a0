//! In-process gossip network.
//!
//! The network owns every node in an arena keyed by [`NodeId`] and moves
//! transactions and blocks between them. Block flooding runs on an explicit
//! FIFO work queue with a per-round visited set, so cyclic neighbor graphs
//! terminate without recursion.

use crate::node::{Authority, Node, NodeConfig, NodeError, Result};
use poanet_consensus::CommitPolicy;
use poanet_core::{Address, Block, Hash, Keypair, NodeId, Transaction};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Outcome of flooding one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloodReport {
    /// Nodes that appended the block, in delivery order.
    pub accepted: Vec<NodeId>,
    /// Deliveries that were rejected (duplicates included).
    pub rejected: usize,
    /// Total deliveries attempted.
    pub deliveries: usize,
}

/// A block produced during a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedBlock {
    pub index: u64,
    pub hash: Hash,
    pub transactions: usize,
    pub signatures: usize,
}

/// What happened in one round of the round-robin driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub proposer: NodeId,
    /// `None` when the proposer had nothing to produce or quorum failed.
    pub block: Option<ProducedBlock>,
}

/// A set of nodes and the directed edges between them.
#[derive(Debug, Default)]
pub struct Network {
    config: NodeConfig,
    nodes: BTreeMap<NodeId, Node>,
    /// Authority ids in registration order; drives the round-robin.
    authorities: Vec<NodeId>,
    /// Initial balances, applied to every node including later ones.
    allocations: BTreeMap<Address, u64>,
    /// Next round number for the round-robin driver.
    round: u64,
}

impl Network {
    /// An empty network whose nodes all use `config`.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Add a plain validating node.
    pub fn add_validator(&mut self, id: NodeId) -> Result<()> {
        let node = Node::validator(id, &self.config);
        self.insert(node)
    }

    /// Add an authority and register its public key with every node.
    pub fn add_authority(&mut self, id: NodeId, keypair: Keypair) -> Result<()> {
        let public_key = keypair.public_key;
        let node = Node::authority(id.clone(), keypair, &self.config);
        self.insert(node)?;
        for node in self.nodes.values_mut() {
            node.register_authority(id.clone(), public_key);
        }
        self.authorities.push(id);
        Ok(())
    }

    fn insert(&mut self, mut node: Node) -> Result<()> {
        if self.nodes.contains_key(node.id()) {
            return Err(NodeError::DuplicateNode(node.id().clone()));
        }
        for authority in &self.authorities {
            if let Some(key) = self.nodes.get(authority).and_then(Node::authority_key) {
                node.register_authority(authority.clone(), *key);
            }
        }
        for (address, amount) in &self.allocations {
            node.fund(address.clone(), *amount);
        }
        debug!(node = %node.id(), authority = node.is_authority(), "node added");
        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Add a directed gossip edge.
    pub fn connect(&mut self, from: &NodeId, to: &NodeId) -> Result<()> {
        if !self.nodes.contains_key(to) {
            return Err(NodeError::UnknownNode(to.clone()));
        }
        self.node_mut(from)?.add_neighbor(to.clone());
        Ok(())
    }

    /// Genesis allocation: set `address`'s balance on every node.
    pub fn fund(&mut self, address: Address, amount: u64) {
        for node in self.nodes.values_mut() {
            node.fund(address.clone(), amount);
        }
        self.allocations.insert(address, amount);
    }

    /// Look up a node by id.
    pub fn node(&self, id: &NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| NodeError::UnknownNode(id.clone()))
    }

    /// Look up a node by id for direct manipulation.
    pub fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| NodeError::UnknownNode(id.clone()))
    }

    /// Every node, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Authority ids in registration order.
    pub fn authorities(&self) -> &[NodeId] {
        &self.authorities
    }

    /// Submit a client transaction at `at` and relay it to every authority.
    ///
    /// Returns the index the next block at `at` will carry.
    pub fn submit_transaction(&mut self, at: &NodeId, tx: &Transaction) -> Result<u64> {
        let next_index = self.node_mut(at)?.submit_transaction(tx)?;
        for authority in &self.authorities {
            if authority == at {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(authority) {
                node.receive_transaction(tx);
            }
        }
        Ok(next_index)
    }

    /// Run one block-production cycle at authority `id`.
    ///
    /// Returns `Ok(None)` when the mempool is empty, the candidate fails local
    /// validation, or (under [`CommitPolicy::AfterQuorum`]) the peers do not
    /// reach quorum. Errors only for unknown or non-authority ids.
    pub fn produce_block(&mut self, id: &NodeId) -> Result<Option<Block>> {
        let policy = self.config.consensus.commit_policy;
        let reward = self.config.consensus.reward_per_endorsement;

        let mut block = {
            let mut authority = self
                .node_mut(id)?
                .as_authority()
                .ok_or_else(|| NodeError::NotAnAuthority(id.clone()))?;
            let block = match authority.propose() {
                Ok(Some(block)) => block,
                Ok(None) => {
                    debug!(authority = %id, "mempool empty, nothing to produce");
                    return Ok(None);
                }
                Err(err) => {
                    warn!(authority = %id, %err, "candidate block failed validation");
                    return Ok(None);
                }
            };
            if policy == CommitPolicy::Optimistic {
                authority.commit(&block)?;
            }
            block
        };

        // Quorum round: every other authority validates against its own
        // state and signs if the block holds.
        let mut endorsers = Vec::new();
        for peer in self.authorities.iter().filter(|peer| *peer != id) {
            let Some(authority) = self.nodes.get_mut(peer).and_then(Node::as_authority) else {
                continue;
            };
            match authority.endorse(&block) {
                Ok(signature) => {
                    block.add_signature(peer.clone(), signature);
                    endorsers.push(peer.clone());
                }
                Err(err) => debug!(authority = %peer, %err, "endorsement refused"),
            }
        }

        let quorum = self.node(id)?.authorities().verify_quorum(&block);
        match (&quorum, policy) {
            (Err(err), CommitPolicy::AfterQuorum) => {
                warn!(
                    authority = %id,
                    index = block.index(),
                    %err,
                    "candidate abandoned"
                );
                return Ok(None);
            }
            (Err(err), CommitPolicy::Optimistic) => {
                warn!(authority = %id, index = block.index(), %err, "flooding without quorum");
            }
            (Ok(_), CommitPolicy::AfterQuorum) => {
                self.with_authority(id, |authority| authority.commit(&block))?;
            }
            (Ok(_), CommitPolicy::Optimistic) => {}
        }

        let mut committed = Vec::new();
        for peer in &endorsers {
            match self.with_authority(peer, |authority| authority.commit(&block)) {
                Ok(()) => committed.push(peer.clone()),
                Err(err) => debug!(authority = %peer, %err, "endorser failed to commit"),
            }
        }
        if reward > 0 {
            let credited = self.with_authority(id, |authority| {
                committed
                    .iter()
                    .try_for_each(|_| authority.credit_reward(reward))
            });
            if let Err(err) = credited {
                warn!(authority = %id, %err, "production reward not credited");
            }
        }

        info!(
            authority = %id,
            index = block.index(),
            block = %block.hash.short(),
            txs = block.tx_count(),
            signatures = block.validators.len(),
            endorsed = committed.len(),
            "block produced"
        );

        let mut origins = vec![id.clone()];
        origins.extend(committed);
        self.flood(&origins, &block);
        Ok(Some(block))
    }

    fn with_authority<T>(
        &mut self,
        id: &NodeId,
        f: impl FnOnce(&mut Authority<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut authority = self
            .node_mut(id)?
            .as_authority()
            .ok_or_else(|| NodeError::NotAnAuthority(id.clone()))?;
        f(&mut authority)
    }

    /// Deliver `block` to the neighbors of every origin, and onward from each
    /// node that accepts it.
    ///
    /// Origins are assumed to hold the block already and are never delivered
    /// to. Each node is visited at most once per flood.
    pub fn flood(&mut self, origins: &[NodeId], block: &Block) -> FloodReport {
        let mut report = FloodReport::default();
        let mut visited: HashSet<NodeId> = origins.iter().cloned().collect();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for origin in origins {
            if let Some(node) = self.nodes.get(origin) {
                queue.extend(node.neighbors().iter().cloned());
            }
        }

        while let Some(target) = queue.pop_front() {
            if !visited.insert(target.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&target) else {
                continue;
            };
            report.deliveries += 1;
            match node.receive_block(block) {
                Ok(()) => {
                    report.accepted.push(target.clone());
                    queue.extend(node.neighbors().iter().cloned());
                }
                Err(err) => {
                    report.rejected += 1;
                    debug!(node = %target, %err, "block not relayed");
                }
            }
        }

        debug!(
            block = %block.hash.short(),
            deliveries = report.deliveries,
            accepted = report.accepted.len(),
            rejected = report.rejected,
            "flood settled"
        );
        report
    }

    /// Strict round-robin production: round `r` is proposed by authority
    /// `r % n` in registration order.
    pub fn run_round_robin(&mut self, rounds: u64) -> Result<Vec<RoundReport>> {
        let mut reports = Vec::new();
        if self.authorities.is_empty() {
            warn!("no authorities registered, nothing to run");
            return Ok(reports);
        }
        for _ in 0..rounds {
            let round = self.round;
            self.round += 1;
            let proposer = self.authorities[(round % self.authorities.len() as u64) as usize].clone();
            let block = self.produce_block(&proposer)?.map(|block| ProducedBlock {
                index: block.index(),
                hash: block.hash,
                transactions: block.tx_count(),
                signatures: block.validators.len(),
            });
            reports.push(RoundReport {
                round,
                proposer,
                block,
            });
        }
        Ok(reports)
    }

    /// Chain length at node `id`.
    pub fn chain_length(&self, id: &NodeId) -> Result<usize> {
        Ok(self.node(id)?.chain_length())
    }

    /// Chain tip at node `id`.
    pub fn last_block_hash(&self, id: &NodeId) -> Result<Hash> {
        Ok(self.node(id)?.last_block_hash())
    }

    /// Balance of `address` as node `id` sees it.
    pub fn balance_of(&self, id: &NodeId, address: &Address) -> Result<u64> {
        Ok(self.node(id)?.balance_of(address))
    }

    /// Whether every node has the same chain tip at the same height.
    pub fn is_converged(&self) -> bool {
        let mut tips = self
            .nodes
            .values()
            .map(|node| (node.chain_length(), node.last_block_hash()));
        match tips.next() {
            Some(first) => tips.all(|tip| tip == first),
            None => true,
        }
    }
}
