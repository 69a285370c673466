pub mod memory;
pub mod persistent;

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

pub use memory::MemoryStorage;
pub use persistent::FileStorage;

/// Byte-keyed store with staged writes.
///
/// Writes are visible to reads immediately but only survive once `flush`
/// succeeds; `discard` drops everything staged since the last flush.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn put(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]);

    fn flush(&mut self) -> Result<(), ChainError>;

    fn discard(&mut self);

    fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Live entries under `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &[u8]) {
        (**self).delete(key)
    }

    fn flush(&mut self) -> Result<(), ChainError> {
        (**self).flush()
    }

    fn discard(&mut self) {
        (**self).discard()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        (**self).scan_prefix(prefix)
    }
}

/// Which [`Storage`] a node keeps its chain in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    File,
}

/// Committed entries plus writes staged on top of them
#[derive(Debug, Clone, Default)]
pub(crate) struct Overlay {
    pub(crate) committed: BTreeMap<Vec<u8>, Vec<u8>>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Overlay {
    pub(crate) fn with_committed(committed: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Overlay {
            committed,
            staged: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None => self.committed.get(key).cloned(),
        }
    }

    pub(crate) fn stage(&mut self, key: &[u8], value: Option<&[u8]>) {
        self.staged.insert(key.to_vec(), value.map(<[u8]>::to_vec));
    }

    /// Fold staged writes into the committed map; returns how many applied
    pub(crate) fn apply(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        let count = staged.len();
        for (key, value) in staged {
            match value {
                Some(v) => self.committed.insert(key, v),
                None => self.committed.remove(&key),
            };
        }
        count
    }

    pub(crate) fn clear_staged(&mut self) {
        self.staged.clear();
    }

    pub(crate) fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let range = (Bound::Included(prefix), Bound::Unbounded);
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .committed
            .range::<[u8], _>(range)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in self
            .staged
            .range::<[u8], _>(range)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => merged.insert(key.clone(), v.clone()),
                None => merged.remove(key),
            };
        }
        merged.into_iter().collect()
    }
}
