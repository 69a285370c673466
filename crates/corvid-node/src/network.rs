//! In-process transport and the backend each validator's engine runs on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corvid_chain::{ChainError, ChainStore, Storage};
use corvid_consensus::{
    Backend, ChainReader, ConsensusError, CoreEvent, ReplicaSnapshot, SnapshotStore,
    ValidatorSet,
};
use corvid_core::{Address, Block, BlockHeader, Hash, ValidatorSeal};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

pub type DynChain = ChainStore<Box<dyn Storage>>;

/// Routes encoded consensus messages between validators of one process
#[derive(Default)]
pub struct LocalNetwork {
    peers: Vec<(Address, UnboundedSender<CoreEvent>)>,
    delivered: AtomicU64,
}

impl LocalNetwork {
    pub fn new(peers: Vec<(Address, UnboundedSender<CoreEvent>)>) -> Self {
        LocalNetwork {
            peers,
            delivered: AtomicU64::new(0),
        }
    }

    fn send(&self, to: &Address, payload: &[u8]) -> bool {
        let Some((_, tx)) = self.peers.iter().find(|(a, _)| a == to) else {
            return false;
        };
        if tx.send(CoreEvent::Inbound(payload.to_vec())).is_err() {
            return false;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

fn backend_err(e: ChainError) -> ConsensusError {
    ConsensusError::Backend(e.to_string())
}

pub struct NodeBackend {
    address: Address,
    network: Arc<LocalNetwork>,
    chain: Arc<DynChain>,
}

impl NodeBackend {
    pub fn new(address: Address, network: Arc<LocalNetwork>, chain: Arc<DynChain>) -> Self {
        NodeBackend {
            address,
            network,
            chain,
        }
    }
}

impl Backend for NodeBackend {
    fn address(&self) -> Address {
        self.address
    }

    fn broadcast(&self, valset: &ValidatorSet, payload: Vec<u8>) -> Result<(), ConsensusError> {
        for to in valset.address_list() {
            if !self.network.send(&to, &payload) {
                debug!("No route to {}", to.short());
            }
        }
        Ok(())
    }

    fn unicast(
        &self,
        valset: &ValidatorSet,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<(), ConsensusError> {
        if !valset.contains(&to) {
            return Err(ConsensusError::UnauthorizedAddress);
        }
        if !self.network.send(&to, &payload) {
            debug!("No route to {}", to.short());
        }
        Ok(())
    }

    fn get_proposal(&self, hash: &Hash) -> Option<Block> {
        self.chain.block_by_hash(hash)
    }

    fn commit(&self, block: &Block) -> Result<(), ConsensusError> {
        let hash = self.chain.append(block).map_err(backend_err)?;
        info!(
            "Finalized block {} at height {} on {}",
            hash.short(),
            block.height(),
            self.address.short()
        );
        Ok(())
    }

    fn pre_commit(&self, block: &Block, seals: &[ValidatorSeal]) -> Result<Block, ConsensusError> {
        Ok(block.with_committed_seals(seals)?)
    }

    fn forward_commit(&self, block: &Block, extra: &[u8]) -> Result<Block, ConsensusError> {
        Ok(block.with_forwarded_extra(extra)?)
    }

    fn last_proposal(&self) -> Result<Block, ConsensusError> {
        self.chain
            .head()
            .ok_or_else(|| backend_err(ChainError::Uninitialized))
    }
}

impl ChainReader for NodeBackend {
    fn get_header(&self, hash: &Hash, height: u64) -> Option<BlockHeader> {
        self.chain.get_block(hash, height).map(|b| b.header)
    }

    fn get_block(&self, hash: &Hash, height: u64) -> Option<Block> {
        self.chain.get_block(hash, height)
    }

    fn current_header(&self) -> Option<BlockHeader> {
        self.chain.head().map(|b| b.header)
    }
}

impl SnapshotStore for NodeBackend {
    fn load(&self) -> Result<Option<ReplicaSnapshot>, ConsensusError> {
        self.chain.load_snapshot().map_err(backend_err)
    }

    fn store(&self, snapshot: &ReplicaSnapshot) -> Result<(), ConsensusError> {
        self.chain.store_snapshot(snapshot).map_err(backend_err)
    }
}
