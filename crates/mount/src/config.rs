//! Mount configuration.

use std::path::PathBuf;
use std::sync::Arc;

use score_storage::{
    EntitySource, Manifest, MetadataCacheSettings, MetadataIndex, StorageBackend,
};
use score_vfs::{MountOptions, StorageFileLayout, VfsOptions};

/// Everything the lifecycle needs to know about one mount.
///
/// # Example
///
/// ```ignore
/// let config = MountConfig::new("/mnt/score")
///     .with_layout(StorageFileLayout::ObjectId)
///     .with_metadata_cache(MetadataCacheSettings::default().with_enabled(true));
/// ```
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Empty directory to mount on.
    pub mount_point: PathBuf,
    /// How objects map onto the directory tree.
    pub layout: StorageFileLayout,
    /// Restricts the view to listed objects when set.
    pub manifest: Option<Manifest>,
    /// Which listings to cache and where.
    pub metadata_cache: MetadataCacheSettings,
    /// Kernel cache, read and user mount options.
    pub vfs: VfsOptions,
}

impl MountConfig {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            layout: StorageFileLayout::default(),
            manifest: None,
            metadata_cache: MetadataCacheSettings::default(),
            vfs: VfsOptions::default(),
        }
    }

    pub fn with_layout(mut self, layout: StorageFileLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn with_metadata_cache(mut self, metadata_cache: MetadataCacheSettings) -> Self {
        self.metadata_cache = metadata_cache;
        self
    }

    pub fn with_vfs(mut self, vfs: VfsOptions) -> Self {
        self.vfs = vfs;
        self
    }

    /// User mount options, parsed from `"k=v,flag"`.
    pub fn with_mount_options(mut self, raw: &str) -> Self {
        self.vfs.mount = MountOptions::parse(raw);
        self
    }

    /// Build the metadata index this configuration describes.
    pub fn metadata_index(
        &self,
        entity_source: Arc<dyn EntitySource>,
        backend: Arc<dyn StorageBackend>,
    ) -> MetadataIndex {
        MetadataIndex::new(entity_source, backend, self.metadata_cache.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MountConfig::new("/mnt/score");
        assert_eq!(config.layout, StorageFileLayout::Bundle);
        assert!(config.manifest.is_none());
        assert!(config.vfs.mount.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = MountConfig::new("/mnt/score")
            .with_layout(StorageFileLayout::ObjectId)
            .with_mount_options("allow_other,uid=1000")
            .with_metadata_cache(MetadataCacheSettings::default().with_directory("/tmp/cache"));

        assert_eq!(config.layout, StorageFileLayout::ObjectId);
        assert_eq!(config.vfs.mount.get("uid"), Some(Some("1000")));
        assert_eq!(config.metadata_cache.directory, PathBuf::from("/tmp/cache"));
    }
}
