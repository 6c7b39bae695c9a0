//! Proof of Authority consensus rules for poanet.
//!
//! This crate provides:
//! - The authority registry and the "at least half" quorum rule
//! - Block proposal and summary signing for authorities
//! - Transaction validation (signature, content hash, balance)
//! - Block validation by full balance re-simulation
//!
//! # Example
//!
//! ```rust
//! use poanet_consensus::{AuthoritySet, BlockProposer};
//! use poanet_core::{Block, Keypair, NodeId};
//!
//! let mut authorities = AuthoritySet::new();
//! let mut proposers = Vec::new();
//! for name in ["AuthorityNode-1", "AuthorityNode-2", "AuthorityNode-3"] {
//!     let keypair = Keypair::generate();
//!     authorities.register(NodeId::from(name), keypair.public_key);
//!     proposers.push(BlockProposer::new(NodeId::from(name), keypair));
//! }
//!
//! let mut block = proposers[0].propose_block(1, Block::genesis().hash, vec![]);
//! proposers[0].sign(&mut block);
//! assert!(authorities.verify_quorum(&block).is_err());
//!
//! proposers[1].sign(&mut block);
//! assert_eq!(authorities.verify_quorum(&block), Ok(2));
//! ```

pub mod poa;
pub mod validator;

// Re-export commonly used types
pub use poa::{AuthoritySet, BlockProposer, CommitPolicy, ConsensusError, PoAConfig};
pub use validator::{BlockValidator, TransactionValidator, ValidationError};
