//! Core ledger primitives for poanet.
//!
//! This crate provides the value types shared by every node:
//! - Blake3 content hashing
//! - Ed25519 keys, signatures, and key-derived addresses
//! - Signed transfer transactions and the `Signer` capability
//! - Blocks with their authority signature sets
//! - The per-node balance table

pub mod balances;
pub mod block;
pub mod crypto;
pub mod hash;
pub mod node_id;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use balances::{BalanceError, Balances};
pub use block::{Block, BlockHeader};
pub use crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_canonical, Hash};
pub use node_id::NodeId;
pub use transaction::{Signer, Transaction, TransactionError};
