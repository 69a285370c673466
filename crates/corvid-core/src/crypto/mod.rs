pub mod hash;
pub mod keys;
pub mod signature;

pub use hash::{hash_blake3, merkle_root, Hash};
pub use keys::{Address, KeyPair, SecretKey};
pub use signature::{seal_digest, sign, verify, Signature};
