//! Simulation configuration file.

use anyhow::{bail, Context, Result};
use poanet_chain::NodeConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A directed gossip edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A client transfer submitted before the first round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Index of the sending client.
    pub from: usize,
    /// Index of the receiving client.
    pub to: usize,
    pub amount: u64,
    /// Node the client submits to.
    pub submit_at: String,
}

/// Everything needed to build and drive a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Consensus and mempool settings shared by every node.
    pub node: NodeConfig,

    /// Authority node names, in round-robin order.
    pub authorities: Vec<String>,

    /// Plain validator node names.
    pub validators: Vec<String>,

    pub edges: Vec<Edge>,

    /// Number of client wallets to generate.
    pub clients: usize,

    /// Starting balance of every client.
    pub initial_balance: u64,

    pub transfers: Vec<TransferConfig>,

    /// Round-robin rounds to run.
    pub rounds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl SimulationConfig {
    /// Three authorities and five validators: the standard demonstration
    /// network.
    pub fn reference() -> Self {
        let edge = |from: &str, to: &str| Edge {
            from: from.to_string(),
            to: to.to_string(),
        };
        SimulationConfig {
            node: NodeConfig::default(),
            authorities: (1..=3).map(|i| format!("AuthorityNode-{}", i)).collect(),
            validators: (1..=5).map(|i| format!("Node-{}", i)).collect(),
            edges: vec![
                edge("AuthorityNode-1", "Node-1"),
                edge("AuthorityNode-1", "Node-2"),
                edge("AuthorityNode-2", "Node-3"),
                edge("AuthorityNode-2", "Node-4"),
                edge("AuthorityNode-3", "Node-5"),
                edge("Node-1", "AuthorityNode-1"),
                edge("Node-2", "AuthorityNode-1"),
                edge("Node-2", "Node-3"),
                edge("Node-3", "AuthorityNode-2"),
                edge("Node-3", "Node-2"),
                edge("Node-4", "AuthorityNode-2"),
                edge("Node-4", "Node-5"),
                edge("Node-5", "AuthorityNode-3"),
                edge("Node-5", "Node-4"),
            ],
            clients: 5,
            initial_balance: 50,
            transfers: vec![
                TransferConfig {
                    from: 0,
                    to: 1,
                    amount: 30,
                    submit_at: "Node-1".to_string(),
                },
                TransferConfig {
                    from: 0,
                    to: 1,
                    amount: 20,
                    submit_at: "Node-5".to_string(),
                },
            ],
            rounds: 10,
        }
    }

    /// Read and validate a JSON config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: SimulationConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Check cross references between nodes, edges, and transfers.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for name in self.authorities.iter().chain(&self.validators) {
            if !names.insert(name.as_str()) {
                bail!("duplicate node name: {}", name);
            }
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !names.contains(end.as_str()) {
                    bail!("edge {} -> {} names unknown node {}", edge.from, edge.to, end);
                }
            }
        }
        for transfer in &self.transfers {
            if transfer.from >= self.clients || transfer.to >= self.clients {
                bail!(
                    "transfer {} -> {} refers to a client outside 0..{}",
                    transfer.from,
                    transfer.to,
                    self.clients
                );
            }
            if !names.contains(transfer.submit_at.as_str()) {
                bail!("transfer submitted at unknown node {}", transfer.submit_at);
            }
        }
        Ok(())
    }
}
