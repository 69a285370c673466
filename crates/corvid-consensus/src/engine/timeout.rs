use corvid_core::{Message, MsgType, TimeoutCert, TimeoutEvent, ValidatorSeal};
use tracing::{debug, info};

use super::Core;
use crate::error::ConsensusError;

impl Core {
    pub(super) fn handle_timeout(&mut self, msg: &Message) -> Result<(), ConsensusError> {
        let event: TimeoutEvent = msg
            .decode_payload()
            .map_err(|e| ConsensusError::InvalidMessage(e.to_string()))?;

        self.smr.check_view(MsgType::Timeout, event.view)?;
        if event.epoch != self.smr.epoch
            || event.digest != TimeoutEvent::digest_for(self.smr.epoch, event.view)
        {
            return Err(ConsensusError::InvalidMessage(format!(
                "timeout digest for {} does not match",
                event.view
            )));
        }

        let round = event.view.round;
        let size = self.messages.add_timeout(round, msg.clone())?;
        debug!(
            "Timeout from {} for {} ({}/{})",
            msg.address.short(),
            event.view,
            size,
            self.valset.q()
        );
        if size < self.valset.q() {
            return Ok(());
        }

        let seals = self
            .messages
            .timeouts(round)
            .into_iter()
            .map(|m| ValidatorSeal {
                address: m.address,
                seal: m.signature,
            })
            .collect();
        let tc = TimeoutCert {
            view: event.view,
            hash: msg.hash()?,
            seals,
        };
        info!("Formed TC for {}", tc.view);
        self.advance_round_by_tc(&tc, true)
    }

    /// A verified TC moves the node forward from any earlier view, so it is
    /// never parked.
    pub(super) fn handle_tc(&mut self, msg: &Message) -> Result<(), ConsensusError> {
        let tc: TimeoutCert = msg
            .decode_payload()
            .map_err(|e| ConsensusError::InvalidMessage(e.to_string()))?;

        if tc.hash != self.expected_tc_hash(tc.view)? {
            return Err(ConsensusError::InvalidTc(format!(
                "hash does not match a timeout for {}",
                tc.view
            )));
        }
        self.signer
            .verify_hash(&self.valset, &tc.hash, &tc.seals)
            .map_err(|e| ConsensusError::InvalidTc(e.to_string()))?;

        info!("Received TC for {} from {}", tc.view, msg.address.short());
        match self.advance_round_by_tc(&tc, false) {
            Err(ConsensusError::Stale(_)) => Err(ConsensusError::OldMessage),
            other => other,
        }
    }
}
