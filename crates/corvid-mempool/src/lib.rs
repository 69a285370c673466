//! Corvid Mempool - Pending proposal requests
//!
//! Block producers hand candidate blocks to the consensus engine through a
//! [`RequestSet`]. It is the one structure shared between the engine actor and
//! outside tasks, so it synchronizes internally.

pub mod pool;

pub use pool::{PendingRequest, RequestError, RequestSet, RequestSetConfig};
