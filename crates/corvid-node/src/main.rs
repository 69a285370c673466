use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod network;
mod node;
mod producer;
mod rpc;

use cli::{Cli, Commands};
use config::{generate_sample_config, NodeConfig};
use node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .pretty()
        .init();

    match cli.command {
        Commands::Run { config } => {
            run_node(config).await?;
        }
        Commands::Init { output, validators } => {
            init_config(output, validators)?;
        }
        Commands::Keygen { output } => {
            generate_keypair(output)?;
        }
        Commands::Status { endpoint } => {
            show_status(&endpoint).await?;
        }
    }

    Ok(())
}

async fn run_node(config_path: PathBuf) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);

    if !config_path.exists() {
        error!(
            "Configuration file not found: {:?}. Run 'corvid init' to create one.",
            config_path
        );
        return Err(anyhow::anyhow!("Configuration file not found"));
    }
    let config = NodeConfig::load(&config_path)?;

    Node::new(config)?.run().await
}

fn init_config(output: PathBuf, validators: usize) -> Result<()> {
    let config = generate_sample_config(validators);
    config.validate()?;
    config.save(&output)?;

    info!("Configuration saved to {:?}", output);
    for (i, key) in config.validator_keys().iter().enumerate() {
        info!("  Validator {}: {}", i, key.address.to_hex());
    }

    println!("\nConfiguration file created: {}", output.display());
    println!("\nTo start the devnet, run:");
    println!("  corvid run --config {}", output.display());

    Ok(())
}

fn generate_keypair(output: Option<PathBuf>) -> Result<()> {
    let keypair = corvid_core::KeyPair::generate();

    println!("Generated new keypair:");
    println!("  Address:     {}", keypair.address.to_hex());
    println!("  Secret key:  {}", keypair.secret.to_hex());

    if let Some(path) = output {
        std::fs::write(&path, keypair.secret.to_hex())?;
        info!("Secret key saved to {:?}", path);
    }

    Ok(())
}

async fn show_status(endpoint: &str) -> Result<()> {
    let url = format!("{}/status", endpoint.trim_end_matches('/'));
    let response = reqwest::get(&url).await?;

    if response.status().is_success() {
        let status: serde_json::Value = response.json().await?;
        println!("Node Status:");
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        error!("Failed to get status: {}", response.status());
    }

    Ok(())
}
