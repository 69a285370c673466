use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use corvid_chain::StorageKind;
use corvid_consensus::ConsensusConfig;
use corvid_core::KeyPair;
use serde::{Deserialize, Serialize};

/// Devnet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub chain_id: u64,

    /// Root of per-validator chain files
    pub data_dir: PathBuf,

    /// Status endpoint bind address
    pub rpc_addr: SocketAddr,

    pub validator_count: usize,

    /// Key seeds, one per validator; empty means `0..validator_count`
    #[serde(default)]
    pub seeds: Vec<u64>,

    /// Pause before a proposer hands its block to consensus
    pub block_interval_ms: u64,

    /// Synthetic transactions per block
    pub txs_per_block: usize,

    pub genesis_timestamp: u64,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default)]
    pub consensus: ConsensusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            chain_id: 1,
            data_dir: PathBuf::from("./corvid-data"),
            rpc_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8545)),
            validator_count: 4,
            seeds: Vec::new(),
            block_interval_ms: 500,
            txs_per_block: 8,
            genesis_timestamp: 0,
            storage: StorageKind::File,
            consensus: ConsensusConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.validator_count == 0 {
            bail!("validator_count must be at least 1");
        }
        if !self.seeds.is_empty() && self.seeds.len() != self.validator_count {
            bail!(
                "{} seeds given for {} validators",
                self.seeds.len(),
                self.validator_count
            );
        }
        if self.consensus.base_timeout_ms == 0 {
            bail!("consensus.base_timeout_ms must be positive");
        }
        Ok(())
    }

    /// Validator keypairs in proposer order
    pub fn validator_keys(&self) -> Vec<KeyPair> {
        if self.seeds.is_empty() {
            (0..self.validator_count as u64)
                .map(KeyPair::from_seed)
                .collect()
        } else {
            self.seeds.iter().copied().map(KeyPair::from_seed).collect()
        }
    }
}

/// Sample configuration for an `n`-validator devnet
pub fn generate_sample_config(validators: usize) -> NodeConfig {
    let genesis_timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    NodeConfig {
        validator_count: validators,
        seeds: (0..validators as u64).map(|i| 1_000 + i).collect(),
        genesis_timestamp,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_is_valid() {
        let config = generate_sample_config(4);
        config.validate().unwrap();
        assert_eq!(config.validator_keys().len(), 4);
        assert!(config.genesis_timestamp > 0);
    }

    #[test]
    fn test_seed_count_must_match() {
        let config = NodeConfig {
            seeds: vec![1, 2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keys_follow_seeds() {
        let implicit = NodeConfig::default().validator_keys();
        let explicit = NodeConfig {
            seeds: vec![0, 1, 2, 3],
            ..Default::default()
        }
        .validator_keys();
        let addresses = |keys: &[KeyPair]| keys.iter().map(|k| k.address).collect::<Vec<_>>();
        assert_eq!(addresses(&implicit), addresses(&explicit));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corvid.json");
        let config = NodeConfig {
            storage: StorageKind::Memory,
            ..generate_sample_config(7)
        };
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.validator_count, 7);
        assert_eq!(loaded.storage, StorageKind::Memory);
        assert_eq!(loaded.seeds, config.seeds);
        assert_eq!(
            loaded.consensus.base_timeout_ms,
            config.consensus.base_timeout_ms
        );
    }
}
