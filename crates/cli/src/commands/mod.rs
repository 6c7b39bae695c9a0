//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod init;
mod simulate;

#[derive(Subcommand)]
pub enum Commands {
    /// Build a network and run the round-robin block production
    Simulate(simulate::SimulateArgs),
    /// Write the reference network as a JSON config
    InitConfig(init::InitConfigArgs),
}

/// Dispatch a parsed subcommand.
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Simulate(args) => simulate::run(args),
        Commands::InitConfig(args) => init::run(args),
    }
}
