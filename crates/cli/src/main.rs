//! poanet CLI entry point.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "poanet")]
#[command(about = "A proof-of-authority ledger network simulation", long_about = None)]
#[command(version)]
struct Cli {
    /// Log consensus and gossip decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("poanet - A proof-of-authority ledger network simulation");
            println!("Run 'poanet --help' for usage information.");
        }
    }
}
