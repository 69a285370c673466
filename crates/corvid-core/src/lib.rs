//! Corvid Core - Consensus primitives, cryptography, and serialization
//!
//! This crate provides the types shared by the consensus engine and the
//! node around it: views, blocks, the header extension carrying consensus
//! metadata, certificates, and the signed wire messages.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{
    hash_blake3, merkle_root, seal_digest, sign, verify, Address, Hash, KeyPair, SecretKey,
    Signature,
};
pub use error::CoreError;
pub use types::*;
