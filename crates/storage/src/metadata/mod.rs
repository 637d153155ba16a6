//! Entity and object indexing with optional on-disk caching.
//!
//! Two listings feed a mount: entities from the metadata server and objects
//! from the storage backend. Each can be cached independently as a JSON
//! artifact so repeated mounts skip the remote enumeration:
//!
//! - `.entities.cache` - entity listing
//! - `.objects.cache` - object listing
//!
//! Cache problems never fail indexing. A corrupt artifact is a miss, a
//! failed write is logged.

mod backend;
mod error;
mod file;

pub use backend::MetadataCacheBackend;
pub use error::MetadataCacheError;
pub use file::FileMetadataCache;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::traits::{EntitySource, StorageBackend};
use crate::types::{Entity, ObjectInfo};

/// The two cached listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Entities,
    Objects,
}

impl CacheKind {
    /// Short name used in artifact names and logs.
    pub fn name(&self) -> &'static str {
        match self {
            CacheKind::Entities => "entities",
            CacheKind::Objects => "objects",
        }
    }

    /// Artifact file name: `".{name}.cache"`.
    pub fn file_name(&self) -> String {
        format!(".{}.cache", self.name())
    }
}

/// Caching switches for the metadata index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetadataCacheSettings {
    /// Cache the entity listing.
    pub cache_entities: bool,
    /// Cache the object listing.
    pub cache_objects: bool,
    /// Directory holding the cache artifacts.
    pub directory: PathBuf,
}

impl Default for MetadataCacheSettings {
    fn default() -> Self {
        Self {
            cache_entities: false,
            cache_objects: false,
            directory: PathBuf::from("."),
        }
    }
}

impl MetadataCacheSettings {
    /// Enable or disable both listings at once.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.cache_entities = enabled;
        self.cache_objects = enabled;
        self
    }

    /// Set the cache directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    fn enabled(&self, kind: CacheKind) -> bool {
        match kind {
            CacheKind::Entities => self.cache_entities,
            CacheKind::Objects => self.cache_objects,
        }
    }
}

/// Resolves the entity and object listings of a deployment.
pub struct MetadataIndex {
    entity_source: Arc<dyn EntitySource>,
    backend: Arc<dyn StorageBackend>,
    settings: MetadataCacheSettings,
    cache: Box<dyn MetadataCacheBackend>,
}

impl MetadataIndex {
    /// Create an index caching into `settings.directory`.
    ///
    /// # Arguments
    /// * `entity_source` - Metadata server client
    /// * `backend` - Storage backend used for object enumeration
    /// * `settings` - Which listings to cache and where
    pub fn new(
        entity_source: Arc<dyn EntitySource>,
        backend: Arc<dyn StorageBackend>,
        settings: MetadataCacheSettings,
    ) -> Self {
        let cache: FileMetadataCache = FileMetadataCache::new(settings.directory.clone());
        Self {
            entity_source,
            backend,
            settings,
            cache: Box::new(cache),
        }
    }

    /// Replace the cache backend.
    pub fn with_cache_backend(mut self, cache: impl MetadataCacheBackend + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    /// Active cache settings.
    pub fn settings(&self) -> &MetadataCacheSettings {
        &self.settings
    }

    /// Every entity known to the metadata server.
    pub async fn resolve_entities(&self) -> Result<Vec<Entity>, StorageError> {
        self.resolve_list(CacheKind::Entities, || self.entity_source.entities())
            .await
    }

    /// Every object in the storage backend.
    pub async fn resolve_objects(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        self.resolve_list(CacheKind::Objects, || self.backend.list_objects())
            .await
    }

    /// Remove both cache artifacts.
    pub async fn clear(&self) {
        for kind in [CacheKind::Entities, CacheKind::Objects] {
            if let Err(e) = self.cache.remove(kind).await {
                warn!("Failed to clear {} cache: {}", kind.name(), e);
            }
        }
    }

    /// Load a listing from cache, or fetch it and cache the result.
    ///
    /// # Arguments
    /// * `kind` - Which listing this is
    /// * `fetch` - Remote call producing the listing
    async fn resolve_list<T, F, Fut>(&self, kind: CacheKind, fetch: F) -> Result<Vec<T>, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, StorageError>>,
    {
        let enabled: bool = self.settings.enabled(kind);

        if enabled {
            if let Some(cached) = self.load_cached::<T>(kind).await {
                debug!("Using cached {} ({} items)", kind.name(), cached.len());
                return Ok(cached);
            }
        }

        info!("Indexing remote {}...", kind.name());
        let items: Vec<T> = fetch().await?;
        info!("Indexed {} {}", items.len(), kind.name());

        if enabled {
            self.store_cached(kind, &items).await;
        }

        Ok(items)
    }

    async fn load_cached<T: DeserializeOwned>(&self, kind: CacheKind) -> Option<Vec<T>> {
        let payload: String = match self.cache.load(kind).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable {} cache: {}", kind.name(), e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<T>>(&payload) {
            Ok(items) => Some(items),
            Err(e) => {
                let err: MetadataCacheError = MetadataCacheError::Corrupt {
                    name: kind.file_name(),
                    message: e.to_string(),
                };
                warn!("Ignoring {}", err);
                None
            }
        }
    }

    async fn store_cached<T: Serialize>(&self, kind: CacheKind, items: &[T]) {
        let payload: String = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize {} cache: {}", kind.name(), e);
                return;
            }
        };

        if let Err(e) = self.cache.store(kind, &payload).await {
            warn!("Failed to write {} cache: {}", kind.name(), e);
        }
    }
}
