//! Operator CLI for The Chain
//!
//! Checks configuration, signs and verifies ticket payloads, runs the chain
//! service with its expiration sweeper, and runs simulated chains against
//! the in-memory store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{config, run, sign, simulate};

#[derive(Parser)]
#[command(name = "thechain")]
#[command(about = "The Chain - membership chain operator tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path; environment variables with the THECHAIN_ prefix
    /// override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration, then print it with secrets redacted
    CheckConfig,

    /// Sign a ticket payload with the configured secret
    Sign {
        /// Payload text exactly as it will be presented
        #[arg(short, long)]
        payload: String,
    },

    /// Verify a payload signature with the configured secret
    Verify {
        /// Payload text
        #[arg(short, long)]
        payload: String,

        /// Base64 signature
        #[arg(short, long)]
        signature: String,
    },

    /// Run the chain service with its expiration sweeper until interrupted
    Run(run::RunArgs),

    /// Grow an in-memory chain on a simulated clock and print it
    Simulate(simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CheckConfig => config::check(cli.config.as_deref())?,
        Commands::Sign { payload } => sign::sign(cli.config.as_deref(), &payload)?,
        Commands::Verify { payload, signature } => {
            sign::verify(cli.config.as_deref(), &payload, &signature)?
        }
        Commands::Run(args) => run::run(cli.config.as_deref(), args).await?,
        Commands::Simulate(args) => simulate::run(cli.config.as_deref(), args).await?,
    }

    Ok(())
}
