use serde::{Deserialize, Serialize};

use crate::crypto::{Address, Hash};
use crate::error::CoreError;
use crate::types::block::Block;
use crate::types::extra::{HeaderExtra, ValidatorSeal};
use crate::types::view::View;

/// Quorum certificate: proof that a quorum voted for `hash` at `view`.
///
/// `extra` is the header extension of the sealed block, so the aggregated
/// committed seals travel in the same layout the chain persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCert {
    pub hash: Hash,
    pub view: View,
    pub proposer: Address,
    pub extra: Vec<u8>,
}

impl QuorumCert {
    /// Certificate anchoring consensus on an already finalized block.
    ///
    /// Used for genesis and for the last committed block at startup; such a
    /// certificate is trusted locally rather than verified.
    pub fn anchor(block: &Block) -> Result<Self, CoreError> {
        let round = if block.header.extra.is_empty() {
            0
        } else {
            block.salt()?.round
        };
        Ok(QuorumCert {
            hash: block.hash()?,
            view: View::new(block.height(), round),
            proposer: block.coinbase(),
            extra: block.header.extra.clone(),
        })
    }

    pub fn height(&self) -> u64 {
        self.view.height
    }

    pub fn round(&self) -> u64 {
        self.view.round
    }

    pub fn committed_seals(&self) -> Result<Vec<ValidatorSeal>, CoreError> {
        if self.extra.is_empty() {
            return Ok(Vec::new());
        }
        Ok(HeaderExtra::decode(&self.extra)?.committed_seals)
    }
}

/// Timeout certificate: proof that a quorum timed out at `view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCert {
    pub view: View,
    /// Signing hash of the timeout message every signer produced for `view`
    pub hash: Hash,
    pub seals: Vec<ValidatorSeal>,
}

impl TimeoutCert {
    pub fn height(&self) -> u64 {
        self.view.height
    }

    pub fn round(&self) -> u64 {
        self.view.round
    }
}
