//! Block header extension field.
//!
//! Consensus metadata travels inside the header's `extra` bytes so that other
//! chain components can read it without knowing the engine:
//!
//! ```text
//! extra = [32B vanity] + bincode(HeaderExtra { validators, seal, committed_seals, salt })
//! ```
//!
//! The proposer seal and the committed seals are excluded from the block hash,
//! so sealing a block never changes its identity.

use serde::{Deserialize, Serialize};

use crate::crypto::{Address, Signature};
use crate::error::CoreError;
use crate::serialize;

/// Length of the vanity prefix preceding the encoded extension.
pub const EXTRA_VANITY: usize = 32;

/// Epoch and round the block was proposed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Salt {
    pub epoch: u64,
    pub round: u64,
}

/// A committed seal contributed by one validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSeal {
    pub address: Address,
    pub seal: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HeaderExtra {
    #[serde(skip)]
    pub vanity: [u8; EXTRA_VANITY],
    pub validators: Vec<Address>,
    /// Proposer's signature over the block hash
    pub seal: Signature,
    /// Aggregated committed seals once a quorum certified the block
    pub committed_seals: Vec<ValidatorSeal>,
    pub salt: Salt,
}

impl HeaderExtra {
    pub fn new(validators: Vec<Address>, salt: Salt) -> Self {
        HeaderExtra {
            validators,
            salt,
            ..Default::default()
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        let body = serialize::to_bytes(self)?;
        let mut out = Vec::with_capacity(EXTRA_VANITY + body.len());
        out.extend_from_slice(&self.vanity);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < EXTRA_VANITY {
            return Err(CoreError::InvalidExtra(format!(
                "{} bytes, shorter than vanity",
                bytes.len()
            )));
        }
        let mut extra: HeaderExtra = serialize::from_bytes(&bytes[EXTRA_VANITY..])
            .map_err(|e| CoreError::InvalidExtra(e.to_string()))?;
        extra.vanity.copy_from_slice(&bytes[..EXTRA_VANITY]);
        Ok(extra)
    }

    /// Copy with both seal kinds cleared, used for hashing.
    pub fn without_seals(&self) -> Self {
        HeaderExtra {
            seal: Signature::default(),
            committed_seals: Vec::new(),
            ..self.clone()
        }
    }
}

/// Rewrite raw extra bytes into their hashing form. Empty extra stays empty.
pub fn filter_seals(extra: &[u8]) -> Result<Vec<u8>, CoreError> {
    if extra.is_empty() {
        return Ok(Vec::new());
    }
    HeaderExtra::decode(extra)?.without_seals().encode()
}
