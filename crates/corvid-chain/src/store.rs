use corvid_core::{serialize, Block, Hash};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ChainError;
use crate::storage::Storage;

const BLOCK_PREFIX: &[u8] = b"blk:";
const HEIGHT_PREFIX: &[u8] = b"hgt:";
const HEAD_KEY: &[u8] = b"meta:head";
const SNAPSHOT_KEY: &[u8] = b"meta:snapshot";

fn block_key(hash: &Hash) -> Vec<u8> {
    [BLOCK_PREFIX, &hash.as_bytes()[..]].concat()
}

fn height_key(height: u64) -> Vec<u8> {
    [HEIGHT_PREFIX, &height.to_be_bytes()[..]].concat()
}

/// Finalized chain over a [`Storage`].
///
/// Blocks are only ever appended at `head + 1` on top of the head block, so
/// the stored chain is linear from genesis.
pub struct ChainStore<S: Storage> {
    storage: RwLock<S>,
}

impl<S: Storage> ChainStore<S> {
    pub fn new(storage: S) -> Self {
        ChainStore {
            storage: RwLock::new(storage),
        }
    }

    /// Store `genesis` into an empty chain, or check it matches the stored one
    pub fn init_genesis(&self, genesis: &Block) -> Result<(), ChainError> {
        let hash = genesis.hash()?;
        if let Some(stored) = self.hash_at(0) {
            if stored != hash {
                return Err(ChainError::GenesisMismatch);
            }
            debug!("Genesis {} already stored", hash.short());
            return Ok(());
        }
        self.write_block(genesis, hash)?;
        info!("Initialized chain with genesis {}", hash.short());
        Ok(())
    }

    /// Append the next finalized block
    pub fn append(&self, block: &Block) -> Result<Hash, ChainError> {
        let head = self.head().ok_or(ChainError::Uninitialized)?;
        let expected = head.height() + 1;
        if block.height() != expected {
            return Err(ChainError::NotSequential {
                expected,
                got: block.height(),
            });
        }
        if block.parent_hash() != head.hash()? {
            return Err(ChainError::ParentMismatch(block.height()));
        }
        let hash = block.hash()?;
        self.write_block(block, hash)?;
        Ok(hash)
    }

    fn write_block(&self, block: &Block, hash: Hash) -> Result<(), ChainError> {
        let bytes = serialize::to_bytes(block)?;
        let mut storage = self.storage.write();
        storage.put(&block_key(&hash), &bytes);
        storage.put(&height_key(block.height()), hash.as_bytes());
        storage.put(HEAD_KEY, &block.height().to_be_bytes());
        let flushed = storage.flush();
        if flushed.is_err() {
            storage.discard();
        }
        flushed
    }

    pub fn height(&self) -> Option<u64> {
        let bytes = self.storage.read().get(HEAD_KEY)?;
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }

    /// Number of stored blocks, genesis included
    pub fn block_count(&self) -> usize {
        self.storage.read().scan_prefix(HEIGHT_PREFIX).len()
    }

    pub fn head(&self) -> Option<Block> {
        self.block_by_height(self.height()?)
    }

    pub fn hash_at(&self, height: u64) -> Option<Hash> {
        let bytes = self.storage.read().get(&height_key(height))?;
        Hash::from_slice(&bytes)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<Block> {
        let bytes = self.storage.read().get(&block_key(hash))?;
        serialize::from_bytes(&bytes).ok()
    }

    pub fn block_by_height(&self, height: u64) -> Option<Block> {
        self.block_by_hash(&self.hash_at(height)?)
    }

    /// Block at `height`, provided its hash is `hash`
    pub fn get_block(&self, hash: &Hash, height: u64) -> Option<Block> {
        if self.hash_at(height)? != *hash {
            return None;
        }
        self.block_by_hash(hash)
    }

    /// Up to `limit` blocks ending at the head, newest first
    pub fn recent(&self, limit: usize) -> Vec<Block> {
        let Some(top) = self.height() else {
            return Vec::new();
        };
        (0..=top)
            .rev()
            .take(limit)
            .filter_map(|h| self.block_by_height(h))
            .collect()
    }

    pub fn store_snapshot<T: Serialize>(&self, snapshot: &T) -> Result<(), ChainError> {
        let bytes = serialize::to_bytes(snapshot)?;
        let mut storage = self.storage.write();
        storage.put(SNAPSHOT_KEY, &bytes);
        storage.flush()
    }

    pub fn load_snapshot<T: DeserializeOwned>(&self) -> Result<Option<T>, ChainError> {
        match self.storage.read().get(SNAPSHOT_KEY) {
            Some(bytes) => Ok(Some(serialize::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}
