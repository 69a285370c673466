use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Expected block at height {expected}, got {got}")]
    NotSequential { expected: u64, got: u64 },

    #[error("Block at height {0} does not extend the head")]
    ParentMismatch(u64),

    #[error("Stored genesis differs from the configured one")]
    GenesisMismatch,

    #[error("Chain has no genesis block")]
    Uninitialized,

    #[error("Core error: {0}")]
    Core(#[from] corvid_core::CoreError),
}
