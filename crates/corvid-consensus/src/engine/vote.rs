use corvid_core::{Message, MsgType, QuorumCert, ValidatorSeal, Vote};
use tracing::{debug, info};

use super::Core;
use crate::error::ConsensusError;

impl Core {
    pub(super) fn handle_vote(&mut self, msg: &Message) -> Result<(), ConsensusError> {
        let vote: Vote = msg
            .decode_payload()
            .map_err(|e| ConsensusError::InvalidMessage(e.to_string()))?;

        self.smr.check_view(MsgType::Vote, vote.view)?;
        if vote.epoch != self.smr.epoch {
            return Err(ConsensusError::InvalidMessage(format!(
                "vote epoch {} differs from local {}",
                vote.epoch, self.smr.epoch
            )));
        }
        self.signer.verify_committed_seal(
            &self.valset,
            &msg.address,
            &vote.committed_seal,
            &vote.hash,
        )?;

        let block = self
            .pool
            .get_block_and_check_height(&vote.hash, vote.view.height)?;
        let proposal_hash = self.smr.proposal.as_ref().map(|b| b.hash()).transpose()?;
        if proposal_hash != Some(vote.hash) {
            return Err(ConsensusError::InvalidMessage(format!(
                "vote for {} is not for the current proposal",
                vote.hash.short()
            )));
        }

        let size = self.messages.add_vote(vote.hash, msg.clone())?;
        debug!(
            "Vote from {} for {} ({}/{})",
            msg.address.short(),
            vote.hash.short(),
            size,
            self.valset.q()
        );
        if size < self.valset.q() {
            return Ok(());
        }

        let seals: Vec<ValidatorSeal> = self
            .messages
            .votes(&vote.hash)
            .iter()
            .filter_map(|m| {
                let v: Vote = m.decode_payload().ok()?;
                Some(ValidatorSeal {
                    address: m.address,
                    seal: v.committed_seal,
                })
            })
            .collect();
        let sealed = self.backend.pre_commit(&block, &seals)?;
        let qc = QuorumCert {
            hash: vote.hash,
            view: vote.view,
            proposer: block.coinbase(),
            extra: sealed.header.extra.clone(),
        };

        self.pool.add_block(sealed.clone(), vote.view.round)?;
        self.pool.add_qc(qc.clone());
        self.smr.set_high_qc(qc.clone());
        self.smr.proposal = Some(sealed);
        self.messages.clear_votes(&vote.hash);
        info!(
            "Formed QC for block {} at {} with {} seals",
            vote.hash.short(),
            vote.view,
            seals.len()
        );

        match self.advance_round_by_qc(&qc) {
            Ok(()) => Ok(()),
            Err(ConsensusError::Stale(view)) => {
                debug!("QC for {} did not move the view", view);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
