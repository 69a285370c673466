use corvid_core::{seal_digest, Message, MsgType, Proposal, QuorumCert, Salt, View, Vote};
use tracing::{debug, info, warn};

use super::Core;
use crate::error::ConsensusError;
use crate::safety;
use crate::smr::Step;

/// A justify QC must precede the proposal's round. Only the genesis anchor
/// shares round zero with the first proposal.
fn justify_precedes(justify: &QuorumCert, view: View) -> bool {
    justify.round() < view.round || (justify.height() == 0 && view.round == 0)
}

impl Core {
    /// Propose a pending request if this node leads the round and has not
    /// proposed yet.
    pub(super) fn try_propose(&mut self) {
        if !self.valset.is_proposer(&self.address)
            || self.smr.step != Step::NewRound
            || self.smr.pending_request.is_some()
        {
            return;
        }
        if let Err(e) = self.propose() {
            warn!("Failed to propose at {}: {}", self.smr.view(), e);
        }
        self.publish_round();
    }

    fn propose(&mut self) -> Result<(), ConsensusError> {
        let Some(high_qc) = self.smr.high_qc.clone() else {
            return Ok(());
        };
        let view = self.smr.view();
        let Some(request) = self.requests.get_request(view.height, &high_qc.hash) else {
            debug!(
                "No request at height {} on {}",
                view.height,
                high_qc.hash.short()
            );
            return Ok(());
        };
        let request_hash = request.hash()?;
        if request.coinbase() != self.address {
            self.requests.remove(&request_hash);
            return Err(ConsensusError::InvalidProposer);
        }

        let mut extra = request.extra()?;
        extra.validators = self.valset.address_list();
        extra.salt = Salt {
            epoch: self.smr.epoch,
            round: view.round,
        };
        extra.committed_seals.clear();
        let unsealed = request.with_extra(&extra)?;
        let hash = unsealed.hash()?;
        extra.seal = self.signer.sign(hash.as_bytes());
        let block = unsealed.with_extra(&extra)?;

        let proposal = Proposal {
            epoch: self.smr.epoch,
            view,
            block: block.clone(),
            justify: high_qc,
        };
        let msg = self.build_message(MsgType::Proposal, &proposal)?;
        self.requests.remove(&request_hash);
        self.smr.pending_request = Some(block);
        self.backend.broadcast(&self.valset, msg.encode()?)?;

        info!(
            "Proposed block {} at {} with {} txs",
            hash.short(),
            view,
            proposal.block.txs.len()
        );
        Ok(())
    }

    /// The committed seals only cover the block hash, so the QC's view and
    /// proposer must match the block it certifies as known locally.
    fn check_certified_block(&self, qc: &QuorumCert) -> Result<(), ConsensusError> {
        let certified = self.pool.get_block_and_check_height(&qc.hash, qc.height())?;
        if certified.salt()?.round != qc.round() || certified.coinbase() != qc.proposer {
            return Err(ConsensusError::InvalidQc(format!(
                "{} does not describe block {}",
                qc.view,
                qc.hash.short()
            )));
        }
        Ok(())
    }

    pub(super) fn handle_proposal(&mut self, msg: &Message) -> Result<(), ConsensusError> {
        let proposal: Proposal = msg
            .decode_payload()
            .map_err(|e| ConsensusError::InvalidMessage(e.to_string()))?;
        let view = proposal.view;
        let block = &proposal.block;
        let justify = &proposal.justify;

        if view < self.smr.view() {
            return Err(ConsensusError::OldMessage);
        }

        if proposal.epoch != self.smr.epoch {
            return Err(ConsensusError::InvalidMessage(format!(
                "epoch {} differs from local {}",
                proposal.epoch, self.smr.epoch
            )));
        }
        if block.height() != view.height {
            return Err(ConsensusError::HeightMismatch {
                expected: view.height,
                got: block.height(),
            });
        }
        if justify.height().checked_add(1) != Some(view.height)
            || !justify_precedes(justify, view)
        {
            return Err(ConsensusError::InvalidMessage(format!(
                "justify {} cannot support {}",
                justify.view, view
            )));
        }
        if block.parent_hash() != justify.hash {
            return Err(ConsensusError::InvalidMessage(
                "block does not extend its justify QC".into(),
            ));
        }
        let salt = block.salt()?;
        if salt.round != view.round || salt.epoch != proposal.epoch {
            return Err(ConsensusError::InvalidMessage(format!(
                "salt {:?} does not match {}",
                salt, view
            )));
        }
        if block.coinbase() != msg.address {
            return Err(ConsensusError::InvalidProposer);
        }

        self.signer.verify_header(&self.valset, &block.header)?;
        if *justify != self.anchor {
            self.signer.verify_qc(&self.valset, justify)?;
            self.check_certified_block(justify)?;
        }

        match self.advance_round_by_qc(justify) {
            Ok(()) | Err(ConsensusError::Stale(_)) => {}
            Err(e) => return Err(e),
        }
        self.smr.set_high_qc(justify.clone());
        if let Err(e) = self.commit_3chain() {
            warn!("Commit attempt failed: {}", e);
        }

        // 2-chain lock: the QC certifying the justified block's parent.
        let parent_qc = self
            .pool
            .get_block(&justify.hash)
            .and_then(|justified| self.pool.get_qc(&justified.parent_hash()))
            .cloned();
        if let Some(qc) = parent_qc {
            self.smr.set_lock_qc(qc);
        }

        self.smr.check_view(MsgType::Proposal, view)?;
        if msg.address != self.valset.calc_proposer_by_index(view.round) {
            return Err(ConsensusError::InvalidProposer);
        }

        let hash = self.pool.add_block(block.clone(), view.round)?;
        self.pool.add_qc(justify.clone());
        self.smr.proposal = Some(block.clone());
        self.smr.step = Step::Proposed;
        self.publish_round();

        safety::vote_rule(view.round, justify, &self.smr)?;
        self.smr.set_latest_vote_round(view.round);
        self.persist_snapshot()?;
        self.smr.step = Step::Voted;

        let vote = Vote {
            epoch: self.smr.epoch,
            view,
            hash,
            state_root: block.header.state_root,
            parent_hash: block.parent_hash(),
            parent_view: justify.view,
            committed_seal: self.signer.sign(&seal_digest(&hash)),
        };
        let vote_msg = self.build_message(MsgType::Vote, &vote)?;
        let next = self.valset.calc_proposer_by_index(view.round.saturating_add(1));
        self.backend
            .unicast(&self.valset, next, vote_msg.encode()?)?;

        info!(
            "Voted for block {} at {} from {}",
            hash.short(),
            view,
            msg.address.short()
        );
        Ok(())
    }
}
