//! Vote and commit eligibility. Pure functions over the replica state.

use corvid_core::{Block, QuorumCert};

use crate::block_pool::BlockPool;
use crate::error::ConsensusError;
use crate::smr::Smr;

/// A vote needs a round above every earlier vote and a justify QC that does
/// not fall behind the lock.
pub fn vote_rule(proposal_round: u64, justify: &QuorumCert, smr: &Smr) -> Result<(), ConsensusError> {
    if smr
        .latest_vote_round
        .is_some_and(|voted| proposal_round <= voted)
    {
        return Err(ConsensusError::VoteRule {
            round: proposal_round,
        });
    }
    if let Some(lock) = &smr.lock_qc {
        if justify.round() < lock.round() {
            return Err(ConsensusError::VoteRule {
                round: proposal_round,
            });
        }
    }
    Ok(())
}

/// Block finalized by the current high and lock QCs, if they form a 3-chain
pub fn commit_rule(pool: &BlockPool, smr: &Smr) -> Option<Block> {
    let high = smr.high_qc.as_ref()?;
    let lock = smr.lock_qc.as_ref()?;
    pool.get_commit_block(high, lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::{Address, Hash, View};

    fn qc(height: u64, round: u64) -> QuorumCert {
        QuorumCert {
            hash: Hash([round as u8; 32]),
            view: View::new(height, round),
            proposer: Address::default(),
            extra: vec![],
        }
    }

    #[test]
    fn test_first_vote_allowed() {
        let smr = Smr::new(0, 0, u64::MAX);
        assert!(vote_rule(0, &qc(0, 0), &smr).is_ok());
    }

    #[test]
    fn test_no_second_vote_in_round() {
        let mut smr = Smr::new(0, 0, u64::MAX);
        smr.set_latest_vote_round(3);
        assert!(matches!(
            vote_rule(3, &qc(2, 2), &smr),
            Err(ConsensusError::VoteRule { round: 3 })
        ));
        assert!(vote_rule(2, &qc(1, 1), &smr).is_err());
        assert!(vote_rule(4, &qc(3, 3), &smr).is_ok());
    }

    #[test]
    fn test_justify_must_reach_lock() {
        let mut smr = Smr::new(0, 0, u64::MAX);
        smr.set_lock_qc(qc(4, 6));
        assert!(vote_rule(9, &qc(4, 5), &smr).is_err());
        assert!(vote_rule(9, &qc(4, 6), &smr).is_ok());
        assert!(vote_rule(9, &qc(5, 8), &smr).is_ok());
    }

    #[test]
    fn test_commit_rule_needs_both_qcs() {
        let genesis = Block::genesis(vec![Address::default()], 0).unwrap();
        let anchor = QuorumCert::anchor(&genesis).unwrap();
        let pool = BlockPool::new(genesis, anchor.clone()).unwrap();

        let mut smr = Smr::new(0, 0, u64::MAX);
        assert!(commit_rule(&pool, &smr).is_none());
        smr.set_high_qc(anchor.clone());
        assert!(commit_rule(&pool, &smr).is_none());
        smr.set_lock_qc(anchor);
        assert!(commit_rule(&pool, &smr).is_none());
    }
}
