use tracing::{debug, info};

use super::Core;
use crate::error::ConsensusError;
use crate::safety;

impl Core {
    /// Finalize the block the current high and lock QCs commit, if any.
    ///
    /// Every replica persists the block unless its chain already has it, then
    /// re-roots the block pool there.
    pub(super) fn commit_3chain(&mut self) -> Result<(), ConsensusError> {
        let Some(block) = safety::commit_rule(&self.pool, &self.smr) else {
            return Ok(());
        };
        let hash = block.hash()?;
        if hash == self.pool.root() {
            return Ok(());
        }

        if self.chain.get_block(&hash, block.height()).is_none() {
            let qc = self
                .pool
                .get_qc(&hash)
                .ok_or(ConsensusError::UnknownBlock)?;
            let sealed = self.backend.forward_commit(&block, &qc.extra)?;
            self.backend.commit(&sealed)?;
            info!(
                "Committed block {} at height {} with {} txs",
                hash.short(),
                block.height(),
                block.txs.len()
            );
        } else {
            debug!("Block {} already finalized", hash.short());
        }

        self.pool.prune(&hash)?;
        self.smr.raise_high_commit_round(block.salt()?.round);
        self.requests.prune_through(block.height());
        self.persist_snapshot()
    }
}
