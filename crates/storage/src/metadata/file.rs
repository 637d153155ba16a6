//! Directory-backed metadata cache.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::backend::MetadataCacheBackend;
use super::error::MetadataCacheError;
use super::CacheKind;

/// Stores each listing as a hidden JSON file (`.entities.cache`,
/// `.objects.cache`) in one directory.
#[derive(Debug, Clone)]
pub struct FileMetadataCache {
    directory: PathBuf,
}

impl FileMetadataCache {
    /// Create a cache rooted at `directory`. The directory is not created.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Path of the artifact for `kind`.
    pub fn path_for(&self, kind: CacheKind) -> PathBuf {
        self.directory.join(kind.file_name())
    }

    fn io_error(path: &Path, source: std::io::Error) -> MetadataCacheError {
        MetadataCacheError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl MetadataCacheBackend for FileMetadataCache {
    async fn load(&self, kind: CacheKind) -> Result<Option<String>, MetadataCacheError> {
        let path: PathBuf = self.path_for(kind);
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    async fn store(&self, kind: CacheKind, payload: &str) -> Result<(), MetadataCacheError> {
        let path: PathBuf = self.path_for(kind);
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| Self::io_error(&path, e))
    }

    async fn remove(&self, kind: CacheKind) -> Result<(), MetadataCacheError> {
        let path: PathBuf = self.path_for(kind);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}
