//! Run a network simulation.

use crate::config::{SimulationConfig, TransferConfig};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use poanet_chain::{Network, Node, RoundReport};
use poanet_consensus::CommitPolicy;
use poanet_core::{Keypair, NodeId, Transaction};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct SimulateArgs {
    /// JSON simulation config (the reference network when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of round-robin rounds
    #[arg(short, long)]
    rounds: Option<u64>,

    /// Override the commit policy
    #[arg(long, value_enum)]
    policy: Option<Policy>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    AfterQuorum,
    Optimistic,
}

impl From<Policy> for CommitPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::AfterQuorum => CommitPolicy::AfterQuorum,
            Policy::Optimistic => CommitPolicy::Optimistic,
        }
    }
}

/// A built network plus the client wallets funded in it.
pub struct Simulation {
    pub network: Network,
    pub clients: Vec<Keypair>,
}

impl Simulation {
    /// Create and wire the configured nodes, then fund the client wallets.
    pub fn build(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut network = Network::new(config.node.clone());
        for name in &config.authorities {
            network.add_authority(NodeId::new(name.as_str()), Keypair::generate())?;
        }
        for name in &config.validators {
            network.add_validator(NodeId::new(name.as_str()))?;
        }
        for edge in &config.edges {
            network
                .connect(&NodeId::new(edge.from.as_str()), &NodeId::new(edge.to.as_str()))
                .with_context(|| format!("Failed to connect {} -> {}", edge.from, edge.to))?;
        }

        let clients: Vec<Keypair> = (0..config.clients).map(|_| Keypair::generate()).collect();
        for client in &clients {
            network.fund(client.address(), config.initial_balance);
        }
        info!(
            authorities = config.authorities.len(),
            validators = config.validators.len(),
            clients = clients.len(),
            "network built"
        );
        Ok(Self { network, clients })
    }

    /// Sign and submit one scripted transfer. Returns the next block index
    /// reported by the receiving node.
    pub fn submit(&mut self, transfer: &TransferConfig) -> Result<u64> {
        let client = |index: usize| {
            self.clients
                .get(index)
                .with_context(|| format!("No client with index {}", index))
        };
        let sender = client(transfer.from)?;
        let recipient = client(transfer.to)?.address();
        let tx = Transaction::signed(sender, recipient, transfer.amount);
        let next_index = self
            .network
            .submit_transaction(&NodeId::new(transfer.submit_at.as_str()), &tx)?;
        Ok(next_index)
    }
}

/// Run the configured simulation and print its outcome.
pub fn run(args: SimulateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::reference(),
    };
    if let Some(rounds) = args.rounds {
        config.rounds = rounds;
    }
    if let Some(policy) = args.policy {
        config.node.consensus.commit_policy = policy.into();
    }

    println!("{}", "Building network...".bold().cyan());
    let mut simulation = Simulation::build(&config)?;
    println!(
        "{}  {} authorities, {} validators, {} clients at {} each",
        "✓".green().bold(),
        config.authorities.len(),
        config.validators.len(),
        config.clients,
        config.initial_balance
    );

    println!();
    println!("{}", "Submitting transfers...".bold().cyan());
    for transfer in &config.transfers {
        let label = format!(
            "client {} -> client {}: {} at {}",
            transfer.from, transfer.to, transfer.amount, transfer.submit_at
        );
        match simulation.submit(transfer) {
            Ok(next_index) => println!(
                "{}  {} (next block {})",
                "✓".green().bold(),
                label,
                next_index.to_string().bright_cyan()
            ),
            Err(err) => println!("{}  {} rejected: {}", "✗".red().bold(), label, err),
        }
    }

    println!();
    println!("{}", format!("Running {} rounds...", config.rounds).bold().cyan());
    let reports = simulation.network.run_round_robin(config.rounds)?;
    print_rounds(&reports);

    println!();
    print_summary(&simulation);
    Ok(())
}

fn print_rounds(reports: &[RoundReport]) {
    for report in reports {
        match &report.block {
            Some(block) => println!(
                "  Round {:>3}  {}  block #{} {} ({} txs, {} signatures)",
                report.round,
                report.proposer.to_string().bright_white(),
                block.index,
                block.hash.short().bright_yellow(),
                block.transactions,
                block.signatures
            ),
            None => println!(
                "  Round {:>3}  {}  {}",
                report.round,
                report.proposer.to_string().bright_white(),
                "no block".bright_black()
            ),
        }
    }
}

/// Production rewards a node has credited to itself, looked up through the
/// node's own authority registry. `None` for validators and empty balances.
fn reward_balance(node: &Node) -> Option<u64> {
    if !node.is_authority() {
        return None;
    }
    let address = node.authorities().reward_address(node.id()).ok()?;
    Some(node.balance_of(&address)).filter(|reward| *reward > 0)
}

fn print_summary(simulation: &Simulation) {
    println!("{}", "Final state:".bold().cyan());
    for node in simulation.network.nodes() {
        let role = if node.is_authority() { "authority" } else { "validator" };
        let balances: Vec<String> = simulation
            .clients
            .iter()
            .map(|client| node.balance_of(&client.address()).to_string())
            .collect();
        let pending = node.mempool().stats();
        println!(
            "  {:<16} {:<9}  length {}  tip {}  balances [{}]  pending {}/{}",
            node.id().to_string(),
            role.bright_black(),
            node.chain_length().to_string().bright_cyan(),
            node.last_block_hash().short().bright_yellow(),
            balances.join(", "),
            pending.total_transactions,
            pending.capacity
        );
        if let Some(reward) = reward_balance(node) {
            println!("  {:<16} reward balance {}", "", reward.to_string().green());
        }
    }

    println!();
    if simulation.network.is_converged() {
        println!("{}  All nodes agree on the chain tip", "✓".green().bold());
    } else {
        println!("{}  Nodes disagree on the chain tip", "✗".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_simulation_converges() {
        let config = SimulationConfig::reference();
        let mut simulation = Simulation::build(&config).unwrap();
        for transfer in &config.transfers {
            assert_eq!(simulation.submit(transfer).unwrap(), 1);
        }
        simulation.network.run_round_robin(config.rounds).unwrap();

        assert!(simulation.network.is_converged());
        let sender = simulation.clients[0].address();
        let recipient = simulation.clients[1].address();
        for node in simulation.network.nodes() {
            assert_eq!(node.chain_length(), 2);
            assert_eq!(node.balance_of(&sender), 0);
            assert_eq!(node.balance_of(&recipient), 100);
        }
    }

    #[test]
    fn test_reward_balance_only_for_paid_authorities() {
        let config = SimulationConfig::reference();
        let mut simulation = Simulation::build(&config).unwrap();
        for node in simulation.network.nodes() {
            assert_eq!(reward_balance(node), None);
        }

        for transfer in &config.transfers {
            simulation.submit(transfer).unwrap();
        }
        simulation.network.run_round_robin(config.rounds).unwrap();

        let paid: Vec<u64> = simulation
            .network
            .nodes()
            .filter_map(reward_balance)
            .collect();
        assert_eq!(paid.len(), 1);
        assert!(paid[0] > 0);
        for node in simulation.network.nodes().filter(|node| !node.is_authority()) {
            assert_eq!(reward_balance(node), None);
            assert_eq!(node.mempool().stats().total_transactions, 0);
        }
    }

    #[test]
    fn test_overdrawing_transfer_rejected_at_submit() {
        let mut config = SimulationConfig::reference();
        config.transfers[0].amount = 51;
        let mut simulation = Simulation::build(&config).unwrap();
        assert!(simulation.submit(&config.transfers[0]).is_err());
    }

    #[test]
    fn test_build_rejects_bad_edge() {
        let mut config = SimulationConfig::reference();
        config.edges[0].to = "ghost".to_string();
        assert!(Simulation::build(&config).is_err());
    }
}
