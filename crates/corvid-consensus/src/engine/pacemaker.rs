use std::time::Duration;

use corvid_core::{
    serialize, Address, Hash, Message, MsgType, QuorumCert, TimeoutCert, TimeoutEvent, View,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Core;
use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::events::CoreEvent;

/// Round timeout: the base plus `2^k` seconds, where `k` grows with the
/// rounds spent since the last commit beyond a grace of three and is capped
/// by the configured exponent.
///
/// The exponent is `round - high_commit_round - 3`. Written the other way
/// round (`high_commit_round - round - 3`) it saturates to zero on every
/// round after a commit and the timer never backs off.
pub fn timeout_duration(config: &ConsensusConfig, round: u64, high_commit_round: u64) -> Duration {
    let exponent = round
        .saturating_sub(high_commit_round)
        .saturating_sub(3)
        .min(config.max_backoff_exponent as u64);
    Duration::from_millis(config.base_timeout_ms) + Duration::from_secs(1u64 << exponent)
}

/// The single outstanding round timer
#[derive(Default)]
pub(crate) struct RoundTimer {
    handle: Option<JoinHandle<()>>,
}

impl RoundTimer {
    /// Cancel any running timer and arm a new one for `view`
    pub(crate) fn start(
        &mut self,
        view: View,
        duration: Duration,
        events: UnboundedSender<CoreEvent>,
    ) {
        self.stop();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(CoreEvent::TimerFired(view));
        }));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Core {
    pub(super) fn restart_timer(&mut self) {
        let duration = timeout_duration(&self.config, self.smr.round, self.smr.high_commit_round);
        debug!(
            "Round timer for {} armed with {:?}",
            self.smr.view(),
            duration
        );
        self.timer
            .start(self.smr.view(), duration, self.events.clone());
    }

    fn is_stale(&self, view: View) -> bool {
        view.round < self.smr.round || view.height < self.smr.height
    }

    /// Move past the view certified by `qc`
    pub(super) fn advance_round_by_qc(&mut self, qc: &QuorumCert) -> Result<(), ConsensusError> {
        if self.is_stale(qc.view) {
            return Err(ConsensusError::Stale(qc.view));
        }
        let height = self.smr.height.max(qc.height()).saturating_add(1);
        let round = self.smr.round.max(qc.round()).saturating_add(1);
        self.smr.set_view(View::new(height, round));
        info!(
            "Advanced to {} by QC for {} at {}",
            self.smr.view(),
            qc.hash.short(),
            qc.view
        );
        self.new_round();
        Ok(())
    }

    /// Move past the round `tc` timed out. No block was certified, so the
    /// height stays.
    pub(super) fn advance_round_by_tc(
        &mut self,
        tc: &TimeoutCert,
        broadcast: bool,
    ) -> Result<(), ConsensusError> {
        if self.is_stale(tc.view) {
            return Err(ConsensusError::Stale(tc.view));
        }
        let round = self.smr.round.max(tc.round()).saturating_add(1);

        if broadcast {
            let next = self.valset.calc_proposer_by_index(round);
            if next != self.address {
                if let Err(e) = self.forward_tc(tc, next) {
                    warn!(
                        "Failed to forward TC for {} to {}: {}",
                        tc.view,
                        next.short(),
                        e
                    );
                }
            }
        }

        let height = self.smr.height.max(tc.height());
        self.smr.set_view(View::new(height, round));
        info!("Advanced to {} by TC for {}", self.smr.view(), tc.view);
        self.new_round();
        Ok(())
    }

    fn forward_tc(&self, tc: &TimeoutCert, to: Address) -> Result<(), ConsensusError> {
        let msg = self.build_message(MsgType::TimeoutCert, tc)?;
        self.backend.unicast(&self.valset, to, msg.encode()?)?;
        debug!("Forwarded TC for {} to {}", tc.view, to.short());
        Ok(())
    }

    /// Broadcast a timeout for the view the timer was armed in
    pub(super) fn handle_timer(&mut self, view: View) {
        if view != self.smr.view() {
            debug!("Ignored stale timer for {}", view);
            return;
        }
        warn!("Round timed out at {}", view);

        let event = TimeoutEvent::new(self.smr.epoch, view);
        let result = self
            .build_message(MsgType::Timeout, &event)
            .and_then(|msg| msg.encode().map_err(ConsensusError::from))
            .and_then(|bytes| self.backend.broadcast(&self.valset, bytes));
        if let Err(e) = result {
            warn!("Failed to broadcast timeout for {}: {}", view, e);
        }
    }

    /// Signing hash a timeout certificate for `view` must carry
    pub(super) fn expected_tc_hash(&self, view: View) -> Result<Hash, ConsensusError> {
        let payload = serialize::to_bytes(&TimeoutEvent::new(self.smr.epoch, view))?;
        Ok(Message::signing_hash(MsgType::Timeout, &payload))
    }
}
