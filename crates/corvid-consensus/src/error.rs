use corvid_core::View;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Old message")]
    OldMessage,

    #[error("Future message")]
    FutureMessage,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Duplicate message")]
    DuplicateMessage,

    #[error("Unauthorized address")]
    UnauthorizedAddress,

    #[error("Unknown parent block")]
    UnknownParent,

    #[error("Unknown block")]
    UnknownBlock,

    #[error("Block height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("Invalid proposer")]
    InvalidProposer,

    #[error("Invalid quorum certificate: {0}")]
    InvalidQc(String),

    #[error("Invalid timeout certificate: {0}")]
    InvalidTc(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: usize },

    #[error("Vote rule rejected proposal at round {round}")]
    VoteRule { round: u64 },

    #[error("Stale certificate for {0}")]
    Stale(View),

    #[error("Empty validator set")]
    EmptyValidatorSet,

    #[error("Cannot load last proposal: {0}")]
    LastProposal(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Core error: {0}")]
    Core(#[from] corvid_core::CoreError),
}
