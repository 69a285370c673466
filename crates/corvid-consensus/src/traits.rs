//! Collaborators the engine consumes but never implements.

use corvid_core::{Address, Block, BlockHeader, Hash, QuorumCert, Signature, ValidatorSeal};

use crate::error::ConsensusError;
use crate::smr::ReplicaSnapshot;
use crate::validator::ValidatorSet;

/// Transport and block sealing
pub trait Backend: Send + Sync {
    fn address(&self) -> Address;

    /// Deliver `payload` to every validator, this node included
    fn broadcast(&self, valset: &ValidatorSet, payload: Vec<u8>) -> Result<(), ConsensusError>;

    fn unicast(
        &self,
        valset: &ValidatorSet,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<(), ConsensusError>;

    fn get_proposal(&self, hash: &Hash) -> Option<Block>;

    /// Persist a finalized block
    fn commit(&self, block: &Block) -> Result<(), ConsensusError>;

    /// Seal `block` with the committed seals of a quorum
    fn pre_commit(&self, block: &Block, seals: &[ValidatorSeal]) -> Result<Block, ConsensusError>;

    /// Rebuild the sealed form of `block` from a certificate's extra bytes
    fn forward_commit(&self, block: &Block, extra: &[u8]) -> Result<Block, ConsensusError>;

    /// Last block the chain finalized, genesis on a fresh node
    fn last_proposal(&self) -> Result<Block, ConsensusError>;
}

/// Read-only view of the finalized chain
pub trait ChainReader: Send + Sync {
    fn get_header(&self, hash: &Hash, height: u64) -> Option<BlockHeader>;
    fn get_block(&self, hash: &Hash, height: u64) -> Option<Block>;
    fn current_header(&self) -> Option<BlockHeader>;
}

/// Every cryptographic operation the engine needs
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn sign(&self, data: &[u8]) -> Signature;

    /// Check `sig` by `address` over `data`; the signer must be a member
    fn check_signature(
        &self,
        valset: &ValidatorSet,
        data: &[u8],
        address: &Address,
        sig: &Signature,
    ) -> Result<Address, ConsensusError>;

    /// Check the proposer seal in the header extension against the coinbase
    fn verify_header(&self, valset: &ValidatorSet, header: &BlockHeader)
        -> Result<(), ConsensusError>;

    fn verify_qc(&self, valset: &ValidatorSet, qc: &QuorumCert) -> Result<(), ConsensusError>;

    fn verify_committed_seal(
        &self,
        valset: &ValidatorSet,
        address: &Address,
        seal: &Signature,
        hash: &Hash,
    ) -> Result<(), ConsensusError>;

    /// Check that a quorum of distinct members signed `hash`
    fn verify_hash(
        &self,
        valset: &ValidatorSet,
        hash: &Hash,
        seals: &[ValidatorSeal],
    ) -> Result<(), ConsensusError>;
}

/// Durable home of the replica's safety state
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<ReplicaSnapshot>, ConsensusError>;
    fn store(&self, snapshot: &ReplicaSnapshot) -> Result<(), ConsensusError>;
}
