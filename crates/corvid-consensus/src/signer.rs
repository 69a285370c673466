use std::collections::HashSet;

use corvid_core::{
    seal_digest, sign, verify, Address, BlockHeader, Hash, HeaderExtra, KeyPair, QuorumCert,
    Signature, ValidatorSeal,
};
use tracing::debug;

use crate::error::ConsensusError;
use crate::traits::Signer;
use crate::validator::ValidatorSet;

/// Production signer backed by the node's Ed25519 key
pub struct Ed25519Signer {
    keypair: KeyPair,
}

impl Ed25519Signer {
    pub fn new(keypair: KeyPair) -> Self {
        Ed25519Signer { keypair }
    }

    /// Count distinct members with a valid signature over `data`
    fn verify_seals(
        valset: &ValidatorSet,
        data: &[u8],
        seals: &[ValidatorSeal],
    ) -> Result<usize, ConsensusError> {
        let mut signers = HashSet::new();
        for vs in seals {
            if !valset.contains(&vs.address) {
                return Err(ConsensusError::UnauthorizedAddress);
            }
            verify(&vs.address, data, &vs.seal).map_err(|_| ConsensusError::InvalidSignature)?;
            if !signers.insert(vs.address) {
                debug!("Duplicate seal from {}", vs.address.short());
            }
        }

        if signers.len() < valset.q() {
            return Err(ConsensusError::InsufficientSignatures {
                have: signers.len(),
                need: valset.q(),
            });
        }
        Ok(signers.len())
    }
}

impl Signer for Ed25519Signer {
    fn address(&self) -> Address {
        self.keypair.address
    }

    fn sign(&self, data: &[u8]) -> Signature {
        sign(&self.keypair.secret, data)
    }

    fn check_signature(
        &self,
        valset: &ValidatorSet,
        data: &[u8],
        address: &Address,
        sig: &Signature,
    ) -> Result<Address, ConsensusError> {
        if !valset.contains(address) {
            return Err(ConsensusError::UnauthorizedAddress);
        }
        verify(address, data, sig).map_err(|_| ConsensusError::InvalidSignature)?;
        Ok(*address)
    }

    fn verify_header(
        &self,
        valset: &ValidatorSet,
        header: &BlockHeader,
    ) -> Result<(), ConsensusError> {
        let extra = HeaderExtra::decode(&header.extra)?;
        let hash = header.hash()?;
        self.check_signature(valset, hash.as_bytes(), &header.coinbase, &extra.seal)?;
        Ok(())
    }

    fn verify_qc(&self, valset: &ValidatorSet, qc: &QuorumCert) -> Result<(), ConsensusError> {
        if qc.proposer != valset.calc_proposer_by_index(qc.round()) {
            return Err(ConsensusError::InvalidQc(format!(
                "proposer {} not expected for round {}",
                qc.proposer.short(),
                qc.round()
            )));
        }

        let extra = HeaderExtra::decode(&qc.extra)
            .map_err(|e| ConsensusError::InvalidQc(e.to_string()))?;
        if extra.salt.round != qc.round() {
            return Err(ConsensusError::InvalidQc(format!(
                "salt round {} differs from view {}",
                extra.salt.round, qc.view
            )));
        }

        Self::verify_seals(valset, &seal_digest(&qc.hash), &extra.committed_seals)
            .map_err(|e| ConsensusError::InvalidQc(e.to_string()))?;
        Ok(())
    }

    fn verify_committed_seal(
        &self,
        valset: &ValidatorSet,
        address: &Address,
        seal: &Signature,
        hash: &Hash,
    ) -> Result<(), ConsensusError> {
        self.check_signature(valset, &seal_digest(hash), address, seal)?;
        Ok(())
    }

    fn verify_hash(
        &self,
        valset: &ValidatorSet,
        hash: &Hash,
        seals: &[ValidatorSeal],
    ) -> Result<(), ConsensusError> {
        Self::verify_seals(valset, hash.as_bytes(), seals)?;
        Ok(())
    }
}
