//! The consensus actor.
//!
//! A [`Core`] owns all replica state and handles one [`CoreEvent`] at a
//! time. Inbound messages, backlog replays, timer expiries and new proposal
//! requests all arrive on the same channel, so nothing inside needs a lock.
//! The only state shared with other tasks is the [`RequestSet`] and the
//! published [`RoundInfo`].

mod commit;
mod pacemaker;
mod proposal;
mod timeout;
mod vote;

pub use pacemaker::timeout_duration;

use std::sync::Arc;

use corvid_core::{serialize, Address, Message, MsgType, QuorumCert};
use corvid_mempool::RequestSet;
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backlog::Backlog;
use crate::block_pool::BlockPool;
use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::events::{CoreEvent, RoundInfo};
use crate::message_pool::MessagePool;
use crate::smr::{Smr, Step};
use crate::traits::{Backend, ChainReader, Signer, SnapshotStore};
use crate::validator::ValidatorSet;

use pacemaker::RoundTimer;

/// External capabilities a [`Core`] is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn Backend>,
    pub signer: Arc<dyn Signer>,
    pub chain: Arc<dyn ChainReader>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

pub struct Core {
    config: ConsensusConfig,
    address: Address,
    backend: Arc<dyn Backend>,
    signer: Arc<dyn Signer>,
    chain: Arc<dyn ChainReader>,
    snapshots: Arc<dyn SnapshotStore>,
    requests: Arc<RequestSet>,
    /// Full validator set of the current epoch
    validators: ValidatorSet,
    /// Snapshot carrying the proposer of the current round
    valset: Arc<ValidatorSet>,
    smr: Smr,
    pool: BlockPool,
    messages: MessagePool,
    backlog: Backlog,
    /// Certificate of the finalized block consensus resumed from
    anchor: QuorumCert,
    timer: RoundTimer,
    events: UnboundedSender<CoreEvent>,
    round_tx: watch::Sender<RoundInfo>,
}

impl Core {
    /// Build an engine resuming from the backend's last finalized block.
    ///
    /// Fails when that block cannot be loaded. A stored snapshot restores the
    /// vote and lock state so a restarted replica never votes twice.
    pub fn new(
        config: ConsensusConfig,
        validators: ValidatorSet,
        deps: Collaborators,
        requests: Arc<RequestSet>,
        events: UnboundedSender<CoreEvent>,
    ) -> Result<Self, ConsensusError> {
        let address = deps.backend.address();
        let last = deps
            .backend
            .last_proposal()
            .map_err(|e| ConsensusError::LastProposal(e.to_string()))?;
        let anchor = QuorumCert::anchor(&last)?;
        let pool = BlockPool::new(last.clone(), anchor.clone())?;

        let mut smr = Smr::new(0, 0, config.first_epoch_end());
        smr.height = last.height() + 1;
        smr.round = if last.height() == 0 {
            0
        } else {
            anchor.round() + 1
        };
        smr.high_commit_round = anchor.round();
        smr.high_qc = Some(anchor.clone());
        smr.lock_qc = Some(anchor.clone());

        if let Some(snapshot) = deps.snapshots.load()? {
            smr.epoch = snapshot.epoch;
            smr.latest_vote_round = snapshot.latest_vote_round;
            smr.raise_high_commit_round(snapshot.high_commit_round);
            if let Some(qc) = snapshot.high_qc {
                smr.set_high_qc(qc);
            }
            if let Some(qc) = snapshot.lock_qc {
                smr.set_lock_qc(qc);
            }
            if let Some(high) = &smr.high_qc {
                smr.height = smr.height.max(high.height() + 1);
                smr.round = smr.round.max(high.round() + 1);
            }
            smr.round = smr.round.max(snapshot.round);
            info!(
                "Restored replica state at {}, last vote round {:?}",
                smr.view(),
                smr.latest_vote_round
            );
        }

        let valset = Arc::new(validators.with_proposer(smr.round));
        let messages = MessagePool::new(&validators);
        let backlog = Backlog::new(address, &validators);
        let (round_tx, _) = watch::channel(RoundInfo::default());

        Ok(Core {
            config,
            address,
            backend: deps.backend,
            signer: deps.signer,
            chain: deps.chain,
            snapshots: deps.snapshots,
            requests,
            validators,
            valset,
            smr,
            pool,
            messages,
            backlog,
            anchor,
            timer: RoundTimer::default(),
            events,
            round_tx,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn smr(&self) -> &Smr {
        &self.smr
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn valset(&self) -> &ValidatorSet {
        &self.valset
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoundInfo> {
        self.round_tx.subscribe()
    }

    pub fn round_info(&self) -> RoundInfo {
        self.round_tx.borrow().clone()
    }

    /// Enter the starting round: arm the timer and propose if it is our turn
    pub fn start(&mut self) {
        info!(
            "Consensus started at {} as {}",
            self.smr.view(),
            self.address.short()
        );
        self.new_round();
    }

    pub fn stop(&mut self) {
        self.timer.stop();
        info!("Consensus stopped at {}", self.smr.view());
    }

    /// Actor loop: handle events until shutdown is signalled
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<CoreEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.start();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        self.stop();
    }

    pub fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::Inbound(bytes) => match Message::decode(&bytes) {
                Ok(msg) => self.handle_message(msg),
                Err(e) => warn!("Dropped undecodable message: {}", e),
            },
            CoreEvent::Replay(msg) => self.handle_message(msg),
            CoreEvent::TimerFired(view) => self.handle_timer(view),
            CoreEvent::Request(hash) => {
                debug!("Request {} available", hash.short());
                self.try_propose();
            }
        }
    }

    fn handle_message(&mut self, msg: Message) {
        match self.dispatch(&msg) {
            Ok(()) => {}
            Err(ConsensusError::FutureMessage) => {
                self.backlog.push(msg);
            }
            Err(ConsensusError::OldMessage) => {
                debug!("Ignored old message from {}", msg.address.short());
            }
            Err(e) => {
                warn!(
                    "Rejected message code {} from {}: {}",
                    msg.code,
                    msg.address.short(),
                    e
                );
            }
        }
        self.process_backlog();
    }

    fn dispatch(&mut self, msg: &Message) -> Result<(), ConsensusError> {
        let msg_type = msg.msg_type()?;
        let hash = msg.hash()?;
        self.signer
            .check_signature(&self.valset, hash.as_bytes(), &msg.address, &msg.signature)?;

        match msg_type {
            MsgType::Proposal => self.handle_proposal(msg),
            MsgType::Vote => self.handle_vote(msg),
            MsgType::Timeout => self.handle_timeout(msg),
            MsgType::TimeoutCert => self.handle_tc(msg),
        }
    }

    fn process_backlog(&mut self) {
        let smr = &self.smr;
        let events = &self.events;
        self.backlog.process(
            |msg| smr.check_view(msg.msg_type()?, msg.view()?),
            |msg| {
                let _ = events.send(CoreEvent::Replay(msg));
            },
        );
    }

    /// Sign `payload` into an envelope from this node
    fn build_message<T: Serialize>(
        &self,
        code: MsgType,
        payload: &T,
    ) -> Result<Message, ConsensusError> {
        let payload = serialize::to_bytes(payload)?;
        let hash = Message::signing_hash(code, &payload);
        Ok(Message {
            code: code as u8,
            payload,
            address: self.address,
            signature: self.signer.sign(hash.as_bytes()),
        })
    }

    /// Reset per-round state after the view moved
    fn new_round(&mut self) {
        self.smr.step = Step::NewRound;
        self.smr.pending_request = None;
        self.valset = Arc::new(self.validators.with_proposer(self.smr.round));
        self.messages.prune(self.smr.round);
        self.restart_timer();
        self.publish_round();
        self.try_propose();
    }

    fn publish_round(&self) {
        let (parent, parent_height) = self
            .smr
            .high_qc
            .as_ref()
            .map(|qc| (qc.hash, qc.height()))
            .unwrap_or_default();
        let is_proposer = self.valset.is_proposer(&self.address);
        self.round_tx.send_replace(RoundInfo {
            view: self.smr.view(),
            proposer: self.valset.get_proposer(),
            parent,
            parent_height,
            is_proposer,
            awaiting_request: is_proposer
                && self.smr.step == Step::NewRound
                && self.smr.pending_request.is_none(),
        });
    }

    fn persist_snapshot(&self) -> Result<(), ConsensusError> {
        self.snapshots.store(&self.smr.snapshot())
    }

    /// Switch to a new epoch. Votes and timeouts in flight are discarded.
    pub fn change_epoch(
        &mut self,
        epoch: u64,
        epoch_start: u64,
        epoch_end: u64,
        validators: ValidatorSet,
    ) {
        info!(
            "Epoch {} covers heights {}..={} with {} validators",
            epoch,
            epoch_start,
            epoch_end,
            validators.len()
        );
        self.smr.epoch = epoch;
        self.smr.epoch_start = epoch_start;
        self.smr.epoch_end = epoch_end;
        self.messages = MessagePool::new(&validators);
        self.backlog = Backlog::new(self.address, &validators);
        self.valset = Arc::new(validators.with_proposer(self.smr.round));
        self.validators = validators;
        self.publish_round();
    }
}
