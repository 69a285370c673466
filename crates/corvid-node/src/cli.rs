use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

/// Corvid - HotStuff consensus devnet
#[derive(Parser)]
#[command(name = "corvid")]
#[command(about = "Corvid consensus node and utilities")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an in-process validator devnet
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "corvid.json")]
        config: PathBuf,
    },

    /// Write a sample configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "corvid.json")]
        output: PathBuf,

        /// Number of validators in the devnet
        #[arg(long, default_value = "4")]
        validators: usize,
    },

    /// Generate a new validator keypair
    Keygen {
        /// Output file for secret key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show node status
    Status {
        /// Status endpoint
        #[arg(short, long, default_value = "http://127.0.0.1:8545")]
        endpoint: String,
    },
}
