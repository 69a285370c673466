use corvid_core::{Block, MsgType, QuorumCert, View};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConsensusError;

/// Progress within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    NewRound,
    Proposed,
    Voted,
}

/// Safety state persisted across restarts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSnapshot {
    pub epoch: u64,
    pub round: u64,
    pub latest_vote_round: Option<u64>,
    pub high_commit_round: u64,
    pub high_qc: Option<QuorumCert>,
    pub lock_qc: Option<QuorumCert>,
}

/// State machine replica: the local record of protocol progress
#[derive(Debug, Clone)]
pub struct Smr {
    pub epoch: u64,
    pub epoch_start: u64,
    pub epoch_end: u64,
    pub round: u64,
    pub height: u64,
    pub high_commit_round: u64,
    /// Unset until the first vote is cast
    pub latest_vote_round: Option<u64>,
    /// Block this node proposed in the current round
    pub pending_request: Option<Block>,
    pub high_qc: Option<QuorumCert>,
    pub lock_qc: Option<QuorumCert>,
    pub proposal: Option<Block>,
    pub step: Step,
}

impl Smr {
    pub fn new(epoch: u64, epoch_start: u64, epoch_end: u64) -> Self {
        Smr {
            epoch,
            epoch_start,
            epoch_end,
            round: 0,
            height: 0,
            high_commit_round: 0,
            latest_vote_round: None,
            pending_request: None,
            high_qc: None,
            lock_qc: None,
            proposal: None,
            step: Step::NewRound,
        }
    }

    pub fn view(&self) -> View {
        View::new(self.height, self.round)
    }

    pub fn set_view(&mut self, view: View) {
        self.height = view.height;
        self.round = view.round;
    }

    /// Replace the high QC when `qc` has a strictly greater view
    pub fn set_high_qc(&mut self, qc: QuorumCert) -> bool {
        if let Some(current) = &self.high_qc {
            if qc.view <= current.view {
                return false;
            }
        }
        debug!("High QC now {} at {}", qc.hash.short(), qc.view);
        self.high_qc = Some(qc);
        true
    }

    /// Replace the lock when `qc` has a strictly greater view
    pub fn set_lock_qc(&mut self, qc: QuorumCert) -> bool {
        if let Some(current) = &self.lock_qc {
            if qc.view <= current.view {
                return false;
            }
        }
        debug!("Locked on {} at {}", qc.hash.short(), qc.view);
        self.lock_qc = Some(qc);
        true
    }

    /// Record a vote; the round must exceed every earlier vote
    pub fn set_latest_vote_round(&mut self, round: u64) -> bool {
        if self.latest_vote_round.is_some_and(|r| round <= r) {
            return false;
        }
        self.latest_vote_round = Some(round);
        true
    }

    pub fn raise_high_commit_round(&mut self, round: u64) {
        self.high_commit_round = self.high_commit_round.max(round);
    }

    /// Classify a message view against the local view and step
    pub fn check_view(&self, msg_type: MsgType, view: View) -> Result<(), ConsensusError> {
        let current = self.view();
        if view < current {
            return Err(ConsensusError::OldMessage);
        }
        if view > current {
            return Err(ConsensusError::FutureMessage);
        }
        match (msg_type, self.step) {
            (MsgType::Vote, Step::NewRound) => Err(ConsensusError::FutureMessage),
            (MsgType::Proposal, Step::Proposed | Step::Voted) => Err(ConsensusError::OldMessage),
            _ => Ok(()),
        }
    }

    pub fn snapshot(&self) -> ReplicaSnapshot {
        ReplicaSnapshot {
            epoch: self.epoch,
            round: self.round,
            latest_vote_round: self.latest_vote_round,
            high_commit_round: self.high_commit_round,
            high_qc: self.high_qc.clone(),
            lock_qc: self.lock_qc.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::{Address, Hash};

    fn qc(height: u64, round: u64) -> QuorumCert {
        QuorumCert {
            hash: Hash([(height * 16 + round) as u8; 32]),
            view: View::new(height, round),
            proposer: Address::default(),
            extra: vec![],
        }
    }

    #[test]
    fn test_high_qc_is_monotonic() {
        let mut smr = Smr::new(0, 0, u64::MAX);
        assert!(smr.set_high_qc(qc(2, 3)));
        assert!(!smr.set_high_qc(qc(2, 3)));
        assert!(!smr.set_high_qc(qc(2, 1)));
        assert!(!smr.set_high_qc(qc(1, 9)));
        assert_eq!(smr.high_qc.as_ref().unwrap().view, View::new(2, 3));
        assert!(smr.set_high_qc(qc(3, 0)));
        assert_eq!(smr.high_qc.as_ref().unwrap().view, View::new(3, 0));
    }

    #[test]
    fn test_lock_qc_is_monotonic_in_any_order() {
        let views = [(1, 1), (3, 4), (2, 2), (3, 4), (3, 2), (4, 5), (0, 0)];
        let mut smr = Smr::new(0, 0, u64::MAX);
        let mut best: Option<View> = None;
        for (h, r) in views {
            smr.set_lock_qc(qc(h, r));
            let view = View::new(h, r);
            best = Some(best.map_or(view, |b| b.max(view)));
            assert_eq!(smr.lock_qc.as_ref().map(|q| q.view), best);
        }
    }

    #[test]
    fn test_latest_vote_round_only_increases() {
        let mut smr = Smr::new(0, 0, u64::MAX);
        assert_eq!(smr.latest_vote_round, None);
        assert!(smr.set_latest_vote_round(0));
        assert!(!smr.set_latest_vote_round(0));
        assert!(smr.set_latest_vote_round(4));
        assert!(!smr.set_latest_vote_round(3));
        assert_eq!(smr.latest_vote_round, Some(4));
    }

    #[test]
    fn test_check_view() {
        let mut smr = Smr::new(0, 0, u64::MAX);
        smr.set_view(View::new(5, 7));

        assert!(matches!(
            smr.check_view(MsgType::Timeout, View::new(5, 6)),
            Err(ConsensusError::OldMessage)
        ));
        assert!(matches!(
            smr.check_view(MsgType::Timeout, View::new(6, 8)),
            Err(ConsensusError::FutureMessage)
        ));
        assert!(smr.check_view(MsgType::Timeout, View::new(5, 7)).is_ok());

        // No proposal yet: votes wait, proposals pass.
        assert!(matches!(
            smr.check_view(MsgType::Vote, View::new(5, 7)),
            Err(ConsensusError::FutureMessage)
        ));
        assert!(smr.check_view(MsgType::Proposal, View::new(5, 7)).is_ok());

        // A second proposal in the same round is old.
        smr.step = Step::Proposed;
        assert!(matches!(
            smr.check_view(MsgType::Proposal, View::new(5, 7)),
            Err(ConsensusError::OldMessage)
        ));
        smr.step = Step::Voted;
        assert!(smr.check_view(MsgType::Vote, View::new(5, 7)).is_ok());
    }
}
