//! CLI module for Cadence
//!
//! Provides commands:
//! - `run`: Schedule the configured jobs until they finish or a signal arrives
//! - `validate`: Load the configuration and check every job

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod run;
pub mod validate;

/// Cadence job runner CLI
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Trigger-driven recurring job runner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured jobs
    Run {
        /// Configuration file (defaults to config/local.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check the configuration without running anything
    Validate {
        /// Configuration file (defaults to config/local.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Run { config }) => run::run(config.as_deref()).await,
        Some(Commands::Validate { config }) => validate::run(config.as_deref()),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
