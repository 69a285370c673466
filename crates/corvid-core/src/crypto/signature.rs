use ed25519_dalek::{Signature as DalekSignature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;

use crate::crypto::hash::Hash;
use crate::crypto::keys::{Address, SecretKey};
use crate::error::CoreError;

/// Domain tag appended to a block hash before it is signed as a committed seal
const COMMIT_SEAL_TAG: u8 = 0x02;

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "BigArray")] pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 64] = slice.try_into().ok()?;
        Some(Signature(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature([0u8; 64])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

/// Sign a message with a secret key
pub fn sign(secret_key: &SecretKey, message: &[u8]) -> Signature {
    Signature(secret_key.signing_key().sign(message).to_bytes())
}

/// Verify a signature against an address and message
pub fn verify(address: &Address, message: &[u8], signature: &Signature) -> Result<(), CoreError> {
    let verifying_key = address.to_verifying_key()?;
    verifying_key
        .verify(message, &DalekSignature::from_bytes(&signature.0))
        .map_err(|_| CoreError::InvalidSignature)
}

/// Bytes a validator signs to vouch for a block in a quorum certificate.
pub fn seal_digest(block_hash: &Hash) -> [u8; 33] {
    let mut digest = [0u8; 33];
    digest[..32].copy_from_slice(block_hash.as_bytes());
    digest[32] = COMMIT_SEAL_TAG;
    digest
}
