//! Corvid Consensus - Event-driven chained HotStuff
//!
//! This crate provides the consensus engine: the replica state machine,
//! the pending block tree, vote and timeout aggregation, the pacemaker,
//! and the actor loop tying them to the node through a small set of
//! collaborator traits.

pub mod backlog;
pub mod block_pool;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod message_pool;
pub mod safety;
pub mod signer;
pub mod smr;
pub mod traits;
pub mod validator;

pub use backlog::Backlog;
pub use block_pool::{BlockPool, BlockTree};
pub use config::ConsensusConfig;
pub use engine::{timeout_duration, Collaborators, Core};
pub use error::ConsensusError;
pub use events::{CoreEvent, RoundInfo};
pub use message_pool::MessagePool;
pub use signer::Ed25519Signer;
pub use smr::{ReplicaSnapshot, Smr, Step};
pub use traits::{Backend, ChainReader, Signer, SnapshotStore};
pub use validator::ValidatorSet;
