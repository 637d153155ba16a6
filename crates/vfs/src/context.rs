//! The authorized, filtered view a mount renders.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use score_common::{format_bytes, format_bytes_units};
use score_storage::{
    ByteRange, Entity, ObjectInfo, PresignRequest, PresignedUrl, PresignedUrlValidator,
    RangeFetcher, StorageBackend, StorageError,
};

/// How objects are arranged in the mounted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageFileLayout {
    /// One directory per bundle holding its files by name.
    #[default]
    Bundle,
    /// Every object at the root, named by object id.
    ObjectId,
}

impl FromStr for StorageFileLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bundle" => Ok(StorageFileLayout::Bundle),
            "object-id" => Ok(StorageFileLayout::ObjectId),
            other => Err(format!("unknown layout: {}", other)),
        }
    }
}

impl fmt::Display for StorageFileLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageFileLayout::Bundle => write!(f, "bundle"),
            StorageFileLayout::ObjectId => write!(f, "object-id"),
        }
    }
}

/// An object joined with the entity describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFile {
    pub object_id: String,
    /// Entity file name, or the object id when no entity exists.
    pub file_name: String,
    pub gnos_id: Option<String>,
    pub last_modified: i64,
    pub size: u64,
}

impl StorageFile {
    fn join(object: &ObjectInfo, entity: Option<&Entity>) -> Self {
        Self {
            object_id: object.id.clone(),
            file_name: entity
                .map(|e| e.file_name.clone())
                .unwrap_or_else(|| object.id.clone()),
            gnos_id: entity.map(|e| e.gnos_id.clone()),
            last_modified: object.last_modified,
            size: object.size,
        }
    }
}

impl fmt::Display for StorageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} @ {} {}",
            self.object_id,
            self.gnos_id.as_deref().unwrap_or("-"),
            self.file_name,
            format_bytes(self.size),
            format_bytes_units(self.size)
        )
    }
}

/// Connection and byte counters of one mount.
#[derive(Debug, Default)]
pub struct MountMetrics {
    connect_count: AtomicU64,
    byte_count: AtomicU64,
}

/// Point-in-time copy of [`MountMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub connect_count: u64,
    pub byte_count: u64,
}

impl MountMetrics {
    /// Count one remote connection.
    pub fn record_connect(&self) {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count bytes delivered to readers.
    pub fn record_bytes(&self, bytes: u64) {
        self.byte_count.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_count: self.connect_count.load(Ordering::Relaxed),
            byte_count: self.byte_count.load(Ordering::Relaxed),
        }
    }
}

/// Entities, filtered objects, layout and metrics of one mount.
///
/// Objects are held sorted by id so every traversal is deterministic.
pub struct MountContext {
    layout: StorageFileLayout,
    backend: Arc<dyn StorageBackend>,
    validator: Arc<dyn PresignedUrlValidator>,
    fetcher: Arc<dyn RangeFetcher>,
    entities: HashMap<String, Entity>,
    objects: Vec<ObjectInfo>,
    object_index: HashMap<String, usize>,
    metrics: Arc<MountMetrics>,
}

impl MountContext {
    /// Create a context.
    ///
    /// # Arguments
    /// * `layout` - Tree layout policy
    /// * `backend` - Issues read URLs
    /// * `validator` - Checks every URL before use
    /// * `fetcher` - Performs ranged reads against presigned URLs
    /// * `entities` - Metadata records; keyed by object id
    /// * `objects` - The object set to expose, already filtered
    pub fn new(
        layout: StorageFileLayout,
        backend: Arc<dyn StorageBackend>,
        validator: Arc<dyn PresignedUrlValidator>,
        fetcher: Arc<dyn RangeFetcher>,
        entities: Vec<Entity>,
        mut objects: Vec<ObjectInfo>,
    ) -> Self {
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        objects.dedup_by(|a, b| a.id == b.id);

        let object_index: HashMap<String, usize> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.id.clone(), i))
            .collect();
        let entities: HashMap<String, Entity> =
            entities.into_iter().map(|e| (e.id.clone(), e)).collect();

        Self {
            layout,
            backend,
            validator,
            fetcher,
            entities,
            objects,
            object_index,
            metrics: Arc::new(MountMetrics::default()),
        }
    }

    pub fn layout(&self) -> StorageFileLayout {
        self.layout
    }

    pub fn fetcher(&self) -> &Arc<dyn RangeFetcher> {
        &self.fetcher
    }

    pub fn metrics(&self) -> &Arc<MountMetrics> {
        &self.metrics
    }

    /// Mounted objects, sorted by id.
    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn object(&self, object_id: &str) -> Option<&ObjectInfo> {
        self.object_index.get(object_id).map(|&i| &self.objects[i])
    }

    pub fn entity(&self, object_id: &str) -> Option<&Entity> {
        self.entities.get(object_id)
    }

    /// Sum of all mounted object sizes.
    pub fn total_size(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }

    /// Mounted objects joined with their entities.
    pub fn files(&self) -> StorageFiles<'_> {
        StorageFiles {
            context: self,
            objects: self.objects.iter(),
        }
    }

    /// Request and validate a read URL for part of an object.
    pub async fn presign_read(
        &self,
        object_id: &str,
        range: ByteRange,
    ) -> Result<PresignedUrl, StorageError> {
        let request: PresignRequest = PresignRequest::read(object_id).with_range(range);
        let url: PresignedUrl = self.backend.presigned_url(&request).await?;
        if !self.validator.validate(&url) {
            return Err(StorageError::UntrustedUrl {
                object_id: object_id.to_string(),
            });
        }
        Ok(url)
    }

    /// Check that the caller may read the mounted objects.
    ///
    /// Reads one byte of the first non-empty object through a validated
    /// presigned URL. Never fails: any error counts as "not authorized".
    /// An empty object set is authorized. When every object is empty only
    /// the URL is checked.
    pub async fn is_authorized(&self) -> bool {
        let Some(first) = self.objects.first() else {
            debug!("No objects to check, access granted");
            return true;
        };
        let target: &ObjectInfo = self.objects.iter().find(|o| o.size > 0).unwrap_or(first);
        let range: ByteRange = ByteRange::new(0, target.size.min(1));

        match self.read_first_byte(&target.id, range).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Access check on {} failed: {}", target.id, e);
                false
            }
        }
    }

    async fn read_first_byte(
        &self,
        object_id: &str,
        range: ByteRange,
    ) -> Result<Vec<u8>, StorageError> {
        let url: PresignedUrl = self.presign_read(object_id, range).await?;
        self.fetcher.fetch(&url, range).await
    }
}

/// Lazy iterator over the mounted files, in object id order.
#[derive(Clone)]
pub struct StorageFiles<'a> {
    context: &'a MountContext,
    objects: std::slice::Iter<'a, ObjectInfo>,
}

impl Iterator for StorageFiles<'_> {
    type Item = StorageFile;

    fn next(&mut self) -> Option<StorageFile> {
        let object: &ObjectInfo = self.objects.next()?;
        Some(StorageFile::join(object, self.context.entity(&object.id)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.objects.size_hint()
    }
}

impl ExactSizeIterator for StorageFiles<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use score_storage::{MemoryBackend, S3QueryValidator};

    fn context(backend: Arc<MemoryBackend>, objects: Vec<ObjectInfo>) -> MountContext {
        MountContext::new(
            StorageFileLayout::Bundle,
            backend.clone(),
            Arc::new(S3QueryValidator::new()),
            backend,
            vec![Entity::new("b", "DO1", "reads.bam")],
            objects,
        )
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("BUNDLE".parse::<StorageFileLayout>(), Ok(StorageFileLayout::Bundle));
        assert_eq!(
            "object-id".parse::<StorageFileLayout>(),
            Ok(StorageFileLayout::ObjectId)
        );
        assert!("flat".parse::<StorageFileLayout>().is_err());
    }

    #[test]
    fn test_files_are_sorted_and_reiterable() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let ctx = context(
            backend,
            vec![ObjectInfo::new("c", 1, 0), ObjectInfo::new("b", 2048, 0), ObjectInfo::new("a", 3, 0)],
        );

        let first: Vec<String> = ctx.files().map(|f| f.object_id).collect();
        let second: Vec<String> = ctx.files().map(|f| f.object_id).collect();
        assert_eq!(first, vec!["a", "b", "c"]);
        assert_eq!(first, second);
        assert_eq!(ctx.files().len(), 3);
        assert_eq!(ctx.total_size(), 2052);
    }

    #[test]
    fn test_storage_file_join_and_display() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let ctx = context(backend, vec![ObjectInfo::new("a", 3, 0), ObjectInfo::new("b", 2048, 0)]);
        let files: Vec<StorageFile> = ctx.files().collect();

        assert_eq!(files[0].file_name, "a");
        assert_eq!(files[0].gnos_id, None);
        assert_eq!(files[1].to_string(), "b: DO1/reads.bam @ 2.00 KB");
    }

    #[tokio::test]
    async fn test_empty_object_set_is_authorized() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        backend.set_deny_presign(true);
        assert!(context(backend, Vec::new()).is_authorized().await);
    }

    #[tokio::test]
    async fn test_access_check_outcomes() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        backend.insert_object("a", vec![1, 2, 3]);
        let ctx = context(backend.clone(), vec![ObjectInfo::new("a", 3, 0)]);

        assert!(ctx.is_authorized().await);

        backend.issue_untrusted_urls(1);
        assert!(!ctx.is_authorized().await);

        backend.set_deny_presign(true);
        assert!(!ctx.is_authorized().await);
    }

    #[tokio::test]
    async fn test_access_check_reads_from_store() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        backend.insert_object("a", vec![1, 2, 3]);
        let ctx = context(backend.clone(), vec![ObjectInfo::new("a", 3, 0)]);

        // URL is issued and valid, but the store refuses the read.
        backend.fail_next_fetches(1);
        assert!(!ctx.is_authorized().await);
        assert_eq!(backend.presign_calls(), 1);
        assert_eq!(backend.fetch_calls(), 1);

        assert!(ctx.is_authorized().await);
        assert_eq!(backend.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_access_check_skips_empty_objects() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        backend.insert_object("a", Vec::new());
        backend.insert_object("b", vec![7]);
        let ctx = context(
            backend.clone(),
            vec![ObjectInfo::new("a", 0, 0), ObjectInfo::new("b", 1, 0)],
        );

        assert!(ctx.is_authorized().await);
        backend.fail_next_fetches(1);
        assert!(!ctx.is_authorized().await);
    }

    #[test]
    fn test_metrics_are_lossless_under_concurrency() {
        let metrics = Arc::new(MountMetrics::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_connect();
                        metrics.record_bytes(3);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                connect_count: 8000,
                byte_count: 24000
            }
        );
    }
}
