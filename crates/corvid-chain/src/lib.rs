//! Corvid Chain - Committed block storage
//!
//! Finalized blocks are kept behind a small key/value [`Storage`] trait with
//! an in-memory and a file-backed implementation. [`ChainStore`] indexes
//! blocks by hash and height and also holds the consensus snapshot a
//! replica restores from after a restart.

pub mod error;
pub mod storage;
pub mod store;

pub use error::ChainError;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageKind};
pub use store::ChainStore;
