//! Speculative blocks not yet finalized, plus the certificates seen for them.

use std::collections::{HashMap, HashSet};

use corvid_core::{Block, Hash, QuorumCert};
use tracing::debug;

use crate::error::ConsensusError;

struct Node {
    block: Block,
    round: u64,
    children: Vec<Hash>,
}

/// Tree of pending blocks rooted at the last finalized block
pub struct BlockTree {
    root: Hash,
    nodes: HashMap<Hash, Node>,
}

impl BlockTree {
    pub fn new(root: Block, round: u64) -> Result<Self, ConsensusError> {
        let hash = root.hash()?;
        let mut nodes = HashMap::new();
        nodes.insert(
            hash,
            Node {
                block: root,
                round,
                children: Vec::new(),
            },
        );
        Ok(BlockTree { root: hash, nodes })
    }

    /// Insert a block directly under its parent, one height above it.
    ///
    /// Re-adding a known hash swaps in the new payload (the sealed form) and
    /// keeps the node's children.
    pub fn add(&mut self, block: Block, round: u64) -> Result<Hash, ConsensusError> {
        let hash = block.hash()?;
        if let Some(node) = self.nodes.get_mut(&hash) {
            node.block = block;
            return Ok(hash);
        }

        let parent = self
            .nodes
            .get_mut(&block.parent_hash())
            .ok_or(ConsensusError::UnknownParent)?;
        let expected = parent.block.height().saturating_add(1);
        if block.height() != expected {
            return Err(ConsensusError::HeightMismatch {
                expected,
                got: block.height(),
            });
        }
        parent.children.push(hash);
        self.nodes.insert(
            hash,
            Node {
                block,
                round,
                children: Vec::new(),
            },
        );
        Ok(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&Block> {
        self.nodes.get(hash).map(|n| &n.block)
    }

    pub fn round_of(&self, hash: &Hash) -> Option<u64> {
        self.nodes.get(hash).map(|n| n.round)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Chain of blocks from the root down to `hash`
    pub fn branch(&self, hash: &Hash) -> Option<Vec<Block>> {
        let mut chain = Vec::new();
        let mut cursor = *hash;
        loop {
            let node = self.nodes.get(&cursor)?;
            chain.push(node.block.clone());
            if cursor == self.root {
                break;
            }
            cursor = node.block.parent_hash();
        }
        chain.reverse();
        Some(chain)
    }

    /// Re-root at `hash`, discarding everything that does not descend from
    /// it. Returns the discarded hashes.
    pub fn prune(&mut self, hash: &Hash) -> Result<Vec<Hash>, ConsensusError> {
        if !self.nodes.contains_key(hash) {
            return Err(ConsensusError::UnknownBlock);
        }

        let mut keep = HashSet::new();
        let mut stack = vec![*hash];
        while let Some(h) = stack.pop() {
            if let Some(node) = self.nodes.get(&h) {
                stack.extend(node.children.iter().copied());
            }
            keep.insert(h);
        }

        let removed: Vec<Hash> = self
            .nodes
            .keys()
            .filter(|h| !keep.contains(h))
            .copied()
            .collect();
        for h in &removed {
            self.nodes.remove(h);
        }
        self.root = *hash;
        Ok(removed)
    }
}

/// Block tree plus the QC cache keyed by certified hash
pub struct BlockPool {
    tree: BlockTree,
    qc_map: HashMap<Hash, QuorumCert>,
}

impl BlockPool {
    pub fn new(root: Block, root_qc: QuorumCert) -> Result<Self, ConsensusError> {
        let tree = BlockTree::new(root, root_qc.round())?;
        let mut qc_map = HashMap::new();
        qc_map.insert(root_qc.hash, root_qc);
        Ok(BlockPool { tree, qc_map })
    }

    pub fn add_block(&mut self, block: Block, round: u64) -> Result<Hash, ConsensusError> {
        self.tree.add(block, round)
    }

    /// Cache a QC; the first certificate for a hash wins
    pub fn add_qc(&mut self, qc: QuorumCert) -> bool {
        if self.qc_map.contains_key(&qc.hash) {
            return false;
        }
        self.qc_map.insert(qc.hash, qc);
        true
    }

    pub fn get_qc(&self, hash: &Hash) -> Option<&QuorumCert> {
        self.qc_map.get(hash)
    }

    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.tree.get(hash)
    }

    pub fn get_block_and_check_height(
        &self,
        hash: &Hash,
        height: u64,
    ) -> Result<Block, ConsensusError> {
        let block = self.tree.get(hash).ok_or(ConsensusError::UnknownBlock)?;
        if block.height() != height {
            return Err(ConsensusError::HeightMismatch {
                expected: height,
                got: block.height(),
            });
        }
        Ok(block.clone())
    }

    /// The 3-chain commit candidate.
    ///
    /// Walks from the block certified by `high_qc` to its grandparent, each
    /// step exactly one height down, and returns the grandparent only when it
    /// is the block certified by `lock_qc`.
    pub fn get_commit_block(&self, high_qc: &QuorumCert, lock_qc: &QuorumCert) -> Option<Block> {
        let high = self.tree.get(&high_qc.hash)?;
        let parent = self.tree.get(&high.parent_hash())?;
        if parent.height() + 1 != high.height() {
            return None;
        }
        let grandparent_hash = parent.parent_hash();
        let grandparent = self.tree.get(&grandparent_hash)?;
        if grandparent.height() + 1 != parent.height() {
            return None;
        }
        if grandparent_hash != lock_qc.hash {
            return None;
        }
        Some(grandparent.clone())
    }

    pub fn branch(&self, hash: &Hash) -> Option<Vec<Block>> {
        self.tree.branch(hash)
    }

    /// Re-root at a committed block and forget certificates of dropped forks
    pub fn prune(&mut self, hash: &Hash) -> Result<(), ConsensusError> {
        let removed = self.tree.prune(hash)?;
        for h in &removed {
            self.qc_map.remove(h);
        }
        debug!(
            "Pruned {} blocks, new root {}",
            removed.len(),
            hash.short()
        );
        Ok(())
    }

    pub fn root(&self) -> Hash {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::{BlockHeader, HeaderExtra, KeyPair, Salt, View};

    fn genesis() -> Block {
        Block::genesis(vec![KeyPair::from_seed(0).address], 0).unwrap()
    }

    fn child(parent: &Block, round: u64) -> Block {
        let proposer = KeyPair::from_seed(0);
        Block::new(
            BlockHeader {
                parent_hash: parent.hash().unwrap(),
                height: parent.height() + 1,
                timestamp: round,
                coinbase: proposer.address,
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                extra: HeaderExtra::new(vec![proposer.address], Salt { epoch: 0, round })
                    .encode()
                    .unwrap(),
            },
            vec![],
        )
    }

    fn qc_for(block: &Block) -> QuorumCert {
        QuorumCert {
            hash: block.hash().unwrap(),
            view: View::new(block.height(), block.salt().unwrap().round),
            proposer: block.coinbase(),
            extra: block.header.extra.clone(),
        }
    }

    /// genesis <- b1 <- b2 <- b3
    fn chain() -> (BlockPool, Vec<Block>) {
        let g = genesis();
        let mut pool = BlockPool::new(g.clone(), QuorumCert::anchor(&g).unwrap()).unwrap();
        let b1 = child(&g, 0);
        let b2 = child(&b1, 1);
        let b3 = child(&b2, 2);
        for (i, b) in [&b1, &b2, &b3].into_iter().enumerate() {
            pool.add_block(b.clone(), i as u64).unwrap();
        }
        (pool, vec![g, b1, b2, b3])
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let (mut pool, blocks) = chain();
        let orphan = child(&child(&blocks[3], 3), 4);
        assert!(matches!(
            pool.add_block(orphan, 4),
            Err(ConsensusError::UnknownParent)
        ));
    }

    #[test]
    fn test_branch_from_root() {
        let (pool, blocks) = chain();
        let branch = pool.branch(&blocks[3].hash().unwrap()).unwrap();
        assert_eq!(branch, blocks);
        assert!(pool.branch(&Hash([9u8; 32])).is_none());
    }

    #[test]
    fn test_qc_first_writer_wins() {
        let (mut pool, blocks) = chain();
        let qc = qc_for(&blocks[1]);
        assert!(pool.add_qc(qc.clone()));

        let mut other = qc.clone();
        other.view = View::new(1, 9);
        assert!(!pool.add_qc(other));
        assert_eq!(pool.get_qc(&qc.hash).unwrap().view, qc.view);
    }

    #[test]
    fn test_height_check() {
        let (pool, blocks) = chain();
        let hash = blocks[2].hash().unwrap();
        assert!(pool.get_block_and_check_height(&hash, 2).is_ok());
        assert!(matches!(
            pool.get_block_and_check_height(&hash, 3),
            Err(ConsensusError::HeightMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(
            pool.get_block_and_check_height(&Hash([7u8; 32]), 2),
            Err(ConsensusError::UnknownBlock)
        ));
    }

    #[test]
    fn test_commit_block_exact_three_chain() {
        let (pool, blocks) = chain();
        let high = qc_for(&blocks[3]);

        // Grandparent of b3 is b1.
        let committed = pool.get_commit_block(&high, &qc_for(&blocks[1])).unwrap();
        assert_eq!(committed, blocks[1]);

        // Lock on any other block yields nothing.
        assert!(pool.get_commit_block(&high, &qc_for(&blocks[2])).is_none());
        assert!(pool.get_commit_block(&high, &qc_for(&blocks[0])).is_none());

        // Not enough history above genesis.
        let low = qc_for(&blocks[1]);
        assert!(pool.get_commit_block(&low, &qc_for(&blocks[0])).is_none());
    }

    #[test]
    fn test_child_must_sit_one_height_above_parent() {
        let (mut pool, blocks) = chain();
        let mut gap = child(&blocks[3], 3);
        gap.header.height += 1;
        assert!(matches!(
            pool.add_block(gap.clone(), 3),
            Err(ConsensusError::HeightMismatch { expected: 4, got: 5 })
        ));

        // A child claiming a far greater height on an early block is refused.
        let mut leap = child(&blocks[1], 5);
        leap.header.height = 4;
        assert!(pool.add_block(leap, 5).is_err());

        assert_eq!(pool.len(), 4);
        assert!(pool
            .get_commit_block(&qc_for(&gap), &qc_for(&blocks[2]))
            .is_none());
    }

    #[test]
    fn test_sealed_readd_keeps_children() {
        let (mut pool, blocks) = chain();
        let mut sealed = blocks[1].extra().unwrap();
        sealed.seal = corvid_core::sign(&KeyPair::from_seed(0).secret, b"seal");
        let sealed_block = blocks[1].with_extra(&sealed).unwrap();

        let hash = pool.add_block(sealed_block.clone(), 0).unwrap();
        assert_eq!(pool.get_block(&hash), Some(&sealed_block));
        assert!(pool.branch(&blocks[3].hash().unwrap()).is_some());
    }

    #[test]
    fn test_prune_discards_forks_and_their_qcs() {
        let (mut pool, blocks) = chain();
        let fork = child(&blocks[1], 7);
        let fork_hash = pool.add_block(fork.clone(), 7).unwrap();
        pool.add_qc(qc_for(&fork));
        pool.add_qc(qc_for(&blocks[2]));

        let b2 = blocks[2].hash().unwrap();
        pool.prune(&b2).unwrap();

        assert_eq!(pool.root(), b2);
        assert!(pool.get_block(&fork_hash).is_none());
        assert!(pool.get_qc(&fork_hash).is_none());
        assert!(pool.get_qc(&b2).is_some());
        assert!(pool.get_block(&blocks[1].hash().unwrap()).is_none());
        assert_eq!(pool.len(), 2);
        assert!(matches!(
            pool.prune(&fork_hash),
            Err(ConsensusError::UnknownBlock)
        ));
    }
}
