//! Write a sample simulation config.

use crate::config::SimulationConfig;
use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct InitConfigArgs {
    /// Output path for the configuration file
    #[arg(short, long, default_value = "poanet.json")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

/// Write the reference config to disk.
pub fn run(args: InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }

    SimulationConfig::reference().save(&args.output)?;
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        args.output.display().to_string().bright_black()
    );
    println!();
    println!(
        "Run it with {}",
        format!("poanet simulate --config {}", args.output.display()).bright_cyan()
    );
    Ok(())
}
