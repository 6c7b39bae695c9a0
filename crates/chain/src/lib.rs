//! Nodes, ledgers, and gossip for poanet.
//!
//! This crate brings the core types and the consensus rules together into a
//! running network:
//! - **Ledger**: per-node append-only chain with duplicate detection
//! - **Mempool**: pending transactions in arrival order
//! - **Node**: validating node, optionally holding block-production rights
//! - **Network**: in-process gossip and the round-robin production driver
//!
//! # Example
//!
//! ```rust
//! use poanet_chain::{Network, NodeConfig};
//! use poanet_core::{Keypair, NodeId, Transaction};
//!
//! let mut network = Network::new(NodeConfig::default());
//! let authority = NodeId::from("AuthorityNode-1");
//! let validator = NodeId::from("Node-1");
//! network.add_authority(authority.clone(), Keypair::generate()).unwrap();
//! network.add_validator(validator.clone()).unwrap();
//! network.connect(&authority, &validator).unwrap();
//!
//! let alice = Keypair::generate();
//! let bob = Keypair::generate();
//! network.fund(alice.address(), 50);
//! network.fund(bob.address(), 50);
//!
//! let tx = Transaction::signed(&alice, bob.address(), 30);
//! network.submit_transaction(&validator, &tx).unwrap();
//! network.produce_block(&authority).unwrap();
//!
//! assert_eq!(network.balance_of(&validator, &alice.address()).unwrap(), 20);
//! assert_eq!(network.balance_of(&validator, &bob.address()).unwrap(), 80);
//! assert!(network.is_converged());
//! ```

pub mod ledger;
pub mod mempool;
pub mod network;
pub mod node;

// Re-export commonly used types
pub use ledger::{Ledger, LedgerError};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
pub use network::{FloodReport, Network, ProducedBlock, RoundReport};
pub use node::{Authority, Node, NodeConfig, NodeError, Role};
