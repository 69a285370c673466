use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use corvid_core::serialize;
use tracing::debug;

use super::{Overlay, Storage};
use crate::error::ChainError;

/// Storage persisted as one bincode image, rewritten on every flush.
///
/// The image is written to a sibling `.tmp` file first and renamed over the
/// old one, so a crash mid-flush leaves the previous image intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    overlay: Overlay,
}

impl FileStorage {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ChainError> {
        let path = path.into();
        let committed = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serialize::from_bytes(&bytes)
                .map_err(|e| ChainError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ChainError::Storage(e.to_string())),
        };
        debug!("Opened {} with {} keys", path.display(), committed.len());

        Ok(FileStorage {
            path,
            overlay: Overlay::with_committed(committed),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_image(&self) -> Result<(), ChainError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| ChainError::Storage(e.to_string()))?;
        }
        let bytes = serialize::to_bytes(&self.overlay.committed)
            .map_err(|e| ChainError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| ChainError::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| ChainError::Storage(e.to_string()))
    }
}

impl Storage for FileStorage {
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
        if self.overlay.apply() == 0 {
            return Ok(());
        }
        self.write_image()
    }

    fn discard(&mut self) {
        self.overlay.clear_staged();
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.overlay.scan_prefix(prefix)
    }
}
