//! Storage of the encoded snapshot between runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

/// Holds at most one cache blob.
pub trait CacheStore: Send + Sync {
    /// The stored blob, or `None` when nothing was stored yet.
    fn read(&self) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replace the stored blob.
    fn write(&self, blob: &[u8]) -> Result<(), CacheError>;

    /// Drop the stored blob, if any.
    fn clear(&self) -> Result<(), CacheError>;
}

/// A cache blob kept in a single file.
///
/// Writes go to a sibling temporary file that is then renamed over the cache
/// file, so readers see either the old blob or the new one.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last modification time of the cache file, if it exists.
    pub fn modified(&self) -> Option<std::time::SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStore for FileCache {
    fn read(&self) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, blob: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        fs::write(&temp, blob)?;
        if let Err(e) = fs::rename(&temp, &self.path) {
            if fs::remove_file(&temp).is_err() {
                log::debug!("Could not remove {}", temp.display());
            }
            return Err(e.into());
        }
        log::debug!("Wrote {} byte cache to {}", blob.len(), self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
