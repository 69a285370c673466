use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use corvid_core::{Block, Hash};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Configuration for the request set
#[derive(Debug, Clone)]
pub struct RequestSetConfig {
    /// Maximum number of requests held across all heights
    pub max_size: usize,
    /// Maximum competing requests for a single height
    pub max_per_height: usize,
}

impl Default for RequestSetConfig {
    fn default() -> Self {
        RequestSetConfig {
            max_size: 1_024,
            max_per_height: 16,
        }
    }
}

/// A candidate block waiting for its proposer's turn
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub block: Block,
    pub hash: Hash,
    pub added_at: u64,
}

#[derive(Default)]
struct Inner {
    by_hash: HashMap<Hash, PendingRequest>,
    /// Request hashes per height, in arrival order
    by_height: BTreeMap<u64, Vec<Hash>>,
}

/// Locally pending proposal requests, keyed by hash and indexed by height
pub struct RequestSet {
    config: RequestSetConfig,
    inner: RwLock<Inner>,
}

impl RequestSet {
    pub fn new(config: RequestSetConfig) -> Self {
        RequestSet {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Add a candidate block
    pub fn add(&self, block: Block) -> Result<Hash, RequestError> {
        let hash = block.hash().map_err(|_| RequestError::InvalidRequest)?;
        let height = block.height();

        let mut inner = self.inner.write();

        if inner.by_hash.contains_key(&hash) {
            return Err(RequestError::AlreadyExists);
        }
        if inner.by_hash.len() >= self.config.max_size {
            return Err(RequestError::PoolFull);
        }
        let at_height = inner.by_height.get(&height).map_or(0, Vec::len);
        if at_height >= self.config.max_per_height {
            return Err(RequestError::HeightLimitReached(height));
        }

        inner.by_height.entry(height).or_default().push(hash);
        inner.by_hash.insert(
            hash,
            PendingRequest {
                block,
                hash,
                added_at: Self::current_timestamp(),
            },
        );

        debug!("Added request {} at height {}", hash.short(), height);
        Ok(hash)
    }

    /// Oldest request at `height` that extends `parent`
    pub fn get_request(&self, height: u64, parent: &Hash) -> Option<Block> {
        let inner = self.inner.read();
        inner
            .by_height
            .get(&height)?
            .iter()
            .filter_map(|hash| inner.by_hash.get(hash))
            .find(|pending| pending.block.parent_hash() == *parent)
            .map(|pending| pending.block.clone())
    }

    pub fn get(&self, hash: &Hash) -> Option<Block> {
        self.inner.read().by_hash.get(hash).map(|p| p.block.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.read().by_hash.contains_key(hash)
    }

    pub fn remove(&self, hash: &Hash) -> Option<Block> {
        let mut inner = self.inner.write();
        let pending = inner.by_hash.remove(hash)?;
        let height = pending.block.height();
        if let Some(hashes) = inner.by_height.get_mut(&height) {
            hashes.retain(|h| h != hash);
            if hashes.is_empty() {
                inner.by_height.remove(&height);
            }
        }
        Some(pending.block)
    }

    /// Drop every request at or below a committed height
    pub fn prune_through(&self, height: u64) -> usize {
        let mut inner = self.inner.write();
        let keep = inner.by_height.split_off(&(height + 1));
        let stale = std::mem::replace(&mut inner.by_height, keep);

        let mut removed = 0;
        for hash in stale.into_values().flatten() {
            if inner.by_hash.remove(&hash).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!("Pruned {} stale requests through height {}", removed, height);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request set errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("Request already exists")]
    AlreadyExists,

    #[error("Request set is full")]
    PoolFull,

    #[error("Too many requests at height {0}")]
    HeightLimitReached(u64),

    #[error("Invalid request")]
    InvalidRequest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_core::{BlockHeader, HeaderExtra, KeyPair, Salt};
    use std::sync::Arc;

    fn request(parent: Hash, height: u64, tag: u8) -> Block {
        let proposer = KeyPair::from_seed(0);
        Block::new(
            BlockHeader {
                parent_hash: parent,
                height,
                timestamp: tag as u64,
                coinbase: proposer.address,
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                extra: HeaderExtra::new(vec![proposer.address], Salt::default())
                    .encode()
                    .unwrap(),
            },
            vec![vec![tag]],
        )
    }

    #[test]
    fn test_add_and_lookup_by_parent() {
        let set = RequestSet::new(RequestSetConfig::default());
        let parent_a = Hash([1u8; 32]);
        let parent_b = Hash([2u8; 32]);

        let a = request(parent_a, 5, 1);
        let b = request(parent_b, 5, 2);
        set.add(a.clone()).unwrap();
        set.add(b.clone()).unwrap();

        assert_eq!(set.get_request(5, &parent_b), Some(b));
        assert_eq!(set.get_request(5, &parent_a), Some(a));
        assert!(set.get_request(6, &parent_a).is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_oldest_request_wins() {
        let set = RequestSet::new(RequestSetConfig::default());
        let parent = Hash([1u8; 32]);
        let first = request(parent, 3, 1);
        set.add(first.clone()).unwrap();
        set.add(request(parent, 3, 2)).unwrap();
        assert_eq!(set.get_request(3, &parent), Some(first));
    }

    #[test]
    fn test_duplicate_and_limits() {
        let set = RequestSet::new(RequestSetConfig {
            max_size: 3,
            max_per_height: 2,
        });
        let parent = Hash::ZERO;
        let block = request(parent, 1, 1);
        set.add(block.clone()).unwrap();
        assert!(matches!(set.add(block), Err(RequestError::AlreadyExists)));

        set.add(request(parent, 1, 2)).unwrap();
        assert!(matches!(
            set.add(request(parent, 1, 3)),
            Err(RequestError::HeightLimitReached(1))
        ));

        set.add(request(parent, 2, 4)).unwrap();
        assert!(matches!(
            set.add(request(parent, 3, 5)),
            Err(RequestError::PoolFull)
        ));
    }

    #[test]
    fn test_remove_and_prune() {
        let set = RequestSet::new(RequestSetConfig::default());
        let parent = Hash::ZERO;
        let low = set.add(request(parent, 1, 1)).unwrap();
        set.add(request(parent, 2, 2)).unwrap();
        set.add(request(parent, 3, 3)).unwrap();

        assert!(set.remove(&low).is_some());
        assert!(!set.contains(&low));
        assert!(set.remove(&low).is_none());

        assert_eq!(set.prune_through(2), 1);
        assert_eq!(set.len(), 1);
        assert!(set.get_request(3, &parent).is_some());
    }

    #[test]
    fn test_shared_across_threads() {
        let set = Arc::new(RequestSet::new(RequestSetConfig::default()));
        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let set = set.clone();
                std::thread::spawn(move || set.add(request(Hash::ZERO, i as u64 + 1, i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(set.len(), 4);
    }
}
