//! Deterministic in-memory cluster.
//!
//! Every replica's backend posts straight into the other replicas' event
//! channels. The cluster drains those channels round-robin with `try_recv`,
//! so a test fully controls ordering, timers and proposal requests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corvid_consensus::{
    Backend, ChainReader, Collaborators, ConsensusConfig, ConsensusError, Core, CoreEvent,
    Ed25519Signer, ReplicaSnapshot, SnapshotStore, ValidatorSet,
};
use corvid_core::{
    serialize, Address, Block, BlockHeader, Hash, HeaderExtra, KeyPair, Message, MsgType,
    Proposal, QuorumCert, Salt, TimeoutCert, TimeoutEvent, ValidatorSeal, View,
};
use corvid_mempool::{RequestSet, RequestSetConfig};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Delivers payloads between replicas; crashed replicas receive nothing
pub struct Router {
    peers: Vec<(Address, UnboundedSender<CoreEvent>)>,
    crashed: RwLock<HashSet<Address>>,
}

impl Router {
    fn deliver(&self, to: &Address, payload: &[u8]) {
        if self.crashed.read().contains(to) {
            return;
        }
        if let Some((_, tx)) = self.peers.iter().find(|(a, _)| a == to) {
            let _ = tx.send(CoreEvent::Inbound(payload.to_vec()));
        }
    }
}

pub struct SimBackend {
    address: Address,
    router: Arc<Router>,
    chain: Mutex<Vec<Block>>,
    snapshot: Mutex<Option<ReplicaSnapshot>>,
    unicast_down: AtomicBool,
}

impl SimBackend {
    pub fn committed(&self) -> Vec<Block> {
        self.chain.lock().clone()
    }

    /// Lose every stored block, genesis included
    pub fn wipe(&self) {
        self.chain.lock().clear();
    }

    /// Replace the stored safety state the next engine resumes from
    pub fn restore_snapshot(&self, snapshot: ReplicaSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }

    pub fn snapshot(&self) -> Option<ReplicaSnapshot> {
        self.snapshot.lock().clone()
    }

    /// Make every unicast fail with a backend error
    pub fn set_unicast_down(&self, down: bool) {
        self.unicast_down.store(down, Ordering::SeqCst);
    }
}

impl Backend for SimBackend {
    fn address(&self) -> Address {
        self.address
    }

    fn broadcast(&self, valset: &ValidatorSet, payload: Vec<u8>) -> Result<(), ConsensusError> {
        for address in valset.address_list() {
            self.router.deliver(&address, &payload);
        }
        Ok(())
    }

    fn unicast(
        &self,
        _valset: &ValidatorSet,
        to: Address,
        payload: Vec<u8>,
    ) -> Result<(), ConsensusError> {
        if self.unicast_down.load(Ordering::SeqCst) {
            return Err(ConsensusError::Backend(format!("no route to {}", to.short())));
        }
        self.router.deliver(&to, &payload);
        Ok(())
    }

    fn get_proposal(&self, hash: &Hash) -> Option<Block> {
        self.chain
            .lock()
            .iter()
            .find(|b| b.hash().ok() == Some(*hash))
            .cloned()
    }

    fn commit(&self, block: &Block) -> Result<(), ConsensusError> {
        let mut chain = self.chain.lock();
        let head = chain.last().map(|b| b.height()).unwrap_or_default();
        if block.height() != head + 1 {
            return Err(ConsensusError::Backend(format!(
                "commit at {} on head {}",
                block.height(),
                head
            )));
        }
        chain.push(block.clone());
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
            .lock()
            .last()
            .cloned()
            .ok_or_else(|| ConsensusError::Backend("empty chain".into()))
    }
}

impl ChainReader for SimBackend {
    fn get_header(&self, hash: &Hash, height: u64) -> Option<BlockHeader> {
        self.get_block(hash, height).map(|b| b.header)
    }

    fn get_block(&self, hash: &Hash, height: u64) -> Option<Block> {
        self.chain
            .lock()
            .get(height as usize)
            .filter(|b| b.hash().ok() == Some(*hash))
            .cloned()
    }

    fn current_header(&self) -> Option<BlockHeader> {
        self.chain.lock().last().map(|b| b.header.clone())
    }
}

impl SnapshotStore for SimBackend {
    fn load(&self) -> Result<Option<ReplicaSnapshot>, ConsensusError> {
        Ok(self.snapshot.lock().clone())
    }

    fn store(&self, snapshot: &ReplicaSnapshot) -> Result<(), ConsensusError> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

pub struct Cluster {
    pub keys: Vec<KeyPair>,
    pub valset: ValidatorSet,
    pub genesis: Block,
    pub config: ConsensusConfig,
    pub router: Arc<Router>,
    pub backends: Vec<Arc<SimBackend>>,
    pub requests: Vec<Arc<RequestSet>>,
    pub senders: Vec<UnboundedSender<CoreEvent>>,
    pub receivers: Vec<UnboundedReceiver<CoreEvent>>,
    pub cores: Vec<Core>,
}

impl Cluster {
    /// `n` replicas on a shared genesis with timers too long to ever fire
    pub fn new(n: u64) -> Self {
        let keys: Vec<_> = (0..n).map(KeyPair::from_seed).collect();
        let addresses: Vec<_> = keys.iter().map(|k| k.address).collect();
        let valset = ValidatorSet::new(addresses.clone()).unwrap();
        let genesis = Block::genesis(addresses.clone(), 0).unwrap();
        let config = ConsensusConfig {
            base_timeout_ms: 3_600_000,
            ..Default::default()
        };

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..n).map(|_| unbounded_channel()).unzip();
        let router = Arc::new(Router {
            peers: addresses.iter().copied().zip(senders.iter().cloned()).collect(),
            crashed: RwLock::new(HashSet::new()),
        });

        let backends: Vec<_> = addresses
            .iter()
            .map(|address| {
                Arc::new(SimBackend {
                    address: *address,
                    router: router.clone(),
                    chain: Mutex::new(vec![genesis.clone()]),
                    snapshot: Mutex::new(None),
                    unicast_down: AtomicBool::new(false),
                })
            })
            .collect();
        let requests: Vec<_> = (0..n)
            .map(|_| Arc::new(RequestSet::new(RequestSetConfig::default())))
            .collect();

        let mut cluster = Cluster {
            keys,
            valset,
            genesis,
            config,
            router,
            backends,
            requests,
            senders,
            receivers,
            cores: Vec::new(),
        };
        for i in 0..n as usize {
            let core = cluster.build_core(i).unwrap();
            cluster.cores.push(core);
        }
        cluster
    }

    /// Fresh engine for replica `i` over its existing backend and snapshot
    pub fn build_core(&self, i: usize) -> Result<Core, ConsensusError> {
        let backend = self.backends[i].clone();
        let deps = Collaborators {
            backend: backend.clone(),
            signer: Arc::new(Ed25519Signer::new(self.keys[i].clone())),
            chain: backend.clone(),
            snapshots: backend,
        };
        Core::new(
            self.config.clone(),
            self.valset.clone(),
            deps,
            self.requests[i].clone(),
            self.senders[i].clone(),
        )
    }

    pub fn crash(&self, i: usize) {
        self.router.crashed.write().insert(self.keys[i].address);
    }

    fn is_live(&self, i: usize) -> bool {
        !self.router.crashed.read().contains(&self.keys[i].address)
    }

    pub fn live(&self) -> Vec<usize> {
        (0..self.cores.len()).filter(|i| self.is_live(*i)).collect()
    }

    pub fn start(&mut self) {
        for i in self.live() {
            self.cores[i].start();
        }
    }

    pub fn inject(&self, i: usize, event: CoreEvent) {
        self.senders[i].send(event).unwrap();
    }

    /// One event per live replica; returns how many were handled
    pub fn step(&mut self) -> usize {
        let mut handled = 0;
        for i in self.live() {
            if let Ok(event) = self.receivers[i].try_recv() {
                self.cores[i].handle_event(event);
                handled += 1;
            }
        }
        handled
    }

    pub fn run_until_idle(&mut self) {
        for _ in 0..100_000 {
            if self.step() == 0 {
                return;
            }
        }
        panic!("cluster never went idle");
    }

    /// Hand every waiting proposer a block on its round's parent, up to
    /// `max_height`. Returns how many requests were supplied.
    pub fn supply_requests(&mut self, max_height: u64) -> usize {
        let mut supplied = 0;
        for i in self.live() {
            let info = self.cores[i].round_info();
            if !info.awaiting_request || info.view.height > max_height {
                continue;
            }
            let block = self.request_block(i, info.parent, info.view.height);
            if let Ok(hash) = self.requests[i].add(block) {
                self.inject(i, CoreEvent::Request(hash));
                supplied += 1;
            }
        }
        supplied
    }

    pub fn request_block(&self, i: usize, parent: Hash, height: u64) -> Block {
        let txs = vec![format!("tx-{}-{}", i, height).into_bytes()];
        let mut block = Block::new(
            BlockHeader {
                parent_hash: parent,
                height,
                timestamp: height * 1_000,
                coinbase: self.keys[i].address,
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                extra: HeaderExtra::new(self.valset.address_list(), Salt::default())
                    .encode()
                    .unwrap(),
            },
            txs,
        );
        block.header.tx_root = block.compute_tx_root();
        block
    }

    /// Alternate between draining messages and feeding proposers
    pub fn drive(&mut self, max_height: u64) {
        loop {
            self.run_until_idle();
            if self.supply_requests(max_height) == 0 {
                return;
            }
        }
    }

    /// Fire the round timer of every live replica at its current view
    pub fn fire_timers(&mut self) {
        for i in self.live() {
            let view = self.cores[i].smr().view();
            self.inject(i, CoreEvent::TimerFired(view));
        }
    }

    pub fn view(&self, i: usize) -> View {
        self.cores[i].smr().view()
    }

    pub fn committed(&self, i: usize) -> Vec<Block> {
        self.backends[i].committed()
    }

    /// Proposal from replica `i` signed outside its engine
    pub fn craft_proposal(
        &self,
        i: usize,
        view: View,
        justify: QuorumCert,
        tag: &str,
    ) -> (Block, Vec<u8>) {
        let key = &self.keys[i];
        let mut block = self.request_block(i, justify.hash, view.height);
        block.txs.push(tag.as_bytes().to_vec());
        block.header.tx_root = block.compute_tx_root();

        let mut extra = block.extra().unwrap();
        extra.salt = Salt {
            epoch: 0,
            round: view.round,
        };
        let unsealed = block.with_extra(&extra).unwrap();
        extra.seal = corvid_core::sign(&key.secret, unsealed.hash().unwrap().as_bytes());
        let block = unsealed.with_extra(&extra).unwrap();

        let proposal = Proposal {
            epoch: 0,
            view,
            block: block.clone(),
            justify,
        };
        (block, self.sign_message(i, MsgType::Proposal, &proposal))
    }

    /// Timeout certificate for `view` sealed by the given replicas
    pub fn craft_tc(&self, view: View, signers: &[usize]) -> TimeoutCert {
        let payload = serialize::to_bytes(&TimeoutEvent::new(0, view)).unwrap();
        let hash = Message::signing_hash(MsgType::Timeout, &payload);
        let seals = signers
            .iter()
            .map(|&i| ValidatorSeal {
                address: self.keys[i].address,
                seal: corvid_core::sign(&self.keys[i].secret, hash.as_bytes()),
            })
            .collect();
        TimeoutCert { view, hash, seals }
    }

    /// Envelope signed with replica `i`'s key
    pub fn sign_message<T: serde::Serialize>(&self, i: usize, code: MsgType, payload: &T) -> Vec<u8> {
        let payload = serialize::to_bytes(payload).unwrap();
        let hash = Message::signing_hash(code, &payload);
        Message {
            code: code as u8,
            payload,
            address: self.keys[i].address,
            signature: corvid_core::sign(&self.keys[i].secret, hash.as_bytes()),
        }
        .encode()
        .unwrap()
    }
}

/// True when one chain is a prefix of the other
pub fn prefix_consistent(a: &[Block], b: &[Block]) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| x.hash().unwrap() == y.hash().unwrap())
}
