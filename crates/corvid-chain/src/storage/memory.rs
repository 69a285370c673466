use super::{Overlay, Storage};
use crate::error::ChainError;

/// Volatile storage for tests and throwaway devnets
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    overlay: Overlay,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushed keys
    pub fn len(&self) -> usize {
        self.overlay.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlay.committed.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.overlay.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.overlay.stage(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.overlay.stage(key, None);
    }

    fn flush(&mut self) -> Result<(), ChainError> {
        self.overlay.apply();
        Ok(())
    }

    fn discard(&mut self) {
        self.overlay.clear_staged();
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.overlay.scan_prefix(prefix)
    }
}
