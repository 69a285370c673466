use serde::{Deserialize, Serialize};

/// Consensus tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Fixed part of every round timeout, in milliseconds
    pub base_timeout_ms: u64,
    /// Cap on the exponential part of the round timeout
    pub max_backoff_exponent: u32,
    /// Blocks per epoch, 0 for a single unbounded epoch
    pub epoch_length: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            base_timeout_ms: 2_000,
            max_backoff_exponent: 6,
            epoch_length: 0,
        }
    }
}

impl ConsensusConfig {
    /// Last height of the first epoch
    pub fn first_epoch_end(&self) -> u64 {
        if self.epoch_length == 0 {
            u64::MAX
        } else {
            self.epoch_length
        }
    }
}
