//! Ranged object reads with bounded retries.

use std::sync::Arc;

use score_storage::{ByteRange, ObjectInfo, PresignedUrl, StorageError};
use tracing::{debug, warn};

use crate::context::MountContext;
use crate::error::VfsError;
use crate::options::ReadOptions;

/// Reads byte ranges of mounted objects.
///
/// Every attempt asks the backend for a fresh presigned URL, so a URL that
/// expired or failed validation is never reused.
pub struct ObjectReader {
    context: Arc<MountContext>,
    options: ReadOptions,
}

impl ObjectReader {
    pub fn new(context: Arc<MountContext>, options: ReadOptions) -> Self {
        Self { context, options }
    }

    /// Read `range` of an object.
    ///
    /// # Arguments
    /// * `object_id` - Mounted object to read
    /// * `range` - Requested bytes; clipped to the object size
    ///
    /// # Returns
    /// The bytes of the clipped range. Empty when the range starts at or past
    /// the end of the object.
    pub async fn read(&self, object_id: &str, range: ByteRange) -> Result<Vec<u8>, VfsError> {
        let object: &ObjectInfo = self
            .context
            .object(object_id)
            .ok_or_else(|| VfsError::ObjectNotFound(object_id.to_string()))?;

        let range: ByteRange = range.clip(object.size);
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let max_attempts: u32 = self.options.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(object_id, range).await {
                Ok(data) => {
                    let metrics = self.context.metrics();
                    metrics.record_connect();
                    metrics.record_bytes(data.len() as u64);
                    return Ok(data);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Read of {} [{}, {}) failed (attempt {}/{}): {}",
                        object_id, range.start, range.end, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(source) => {
                    return Err(VfsError::ReadFailure {
                        object_id: object_id.to_string(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    async fn attempt(&self, object_id: &str, range: ByteRange) -> Result<Vec<u8>, StorageError> {
        let url: PresignedUrl = self.context.presign_read(object_id, range).await?;
        let data: Vec<u8> = self.context.fetcher().fetch(&url, range).await?;
        debug!("Read {} bytes of {} at {}", data.len(), object_id, range.start);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StorageFileLayout;
    use score_storage::{MemoryBackend, S3QueryValidator};
    use std::time::Duration;

    fn reader(backend: &Arc<MemoryBackend>, max_attempts: u32) -> ObjectReader {
        backend.insert_object("obj", (0u8..100).collect());
        let context = MountContext::new(
            StorageFileLayout::ObjectId,
            backend.clone(),
            Arc::new(S3QueryValidator::new()),
            backend.clone(),
            Vec::new(),
            vec![ObjectInfo::new("obj", 100, 0)],
        );
        let options = ReadOptions::default()
            .with_max_attempts(max_attempts)
            .with_retry_delay(Duration::from_millis(1));
        ObjectReader::new(Arc::new(context), options)
    }

    #[tokio::test]
    async fn test_read_clips_to_object_size() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let reader = reader(&backend, 3);

        let data = reader.read("obj", ByteRange::new(90, 200)).await.unwrap();
        assert_eq!(data, (90u8..100).collect::<Vec<u8>>());

        let snapshot = reader.context.metrics().snapshot();
        assert_eq!(snapshot.connect_count, 1);
        assert_eq!(snapshot.byte_count, 10);
    }

    #[tokio::test]
    async fn test_empty_range_skips_network() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let reader = reader(&backend, 3);

        assert!(reader.read("obj", ByteRange::new(100, 150)).await.unwrap().is_empty());
        assert!(reader.read("obj", ByteRange::new(5, 5)).await.unwrap().is_empty());
        assert_eq!(backend.presign_calls(), 0);
        assert_eq!(backend.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_with_fresh_urls() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let reader = reader(&backend, 3);
        backend.issue_untrusted_urls(1);
        backend.fail_next_fetches(1);

        let data = reader.read("obj", ByteRange::new(0, 4)).await.unwrap();
        assert_eq!(data, vec![0, 1, 2, 3]);
        assert_eq!(backend.presign_calls(), 3);
        assert_eq!(backend.fetch_calls(), 2);
        assert_eq!(reader.context.metrics().snapshot().connect_count, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let reader = reader(&backend, 2);
        backend.fail_next_fetches(5);

        let err = reader.read("obj", ByteRange::new(0, 4)).await.unwrap_err();
        assert!(matches!(err, VfsError::ReadFailure { attempts: 2, .. }));
        assert_eq!(backend.fetch_calls(), 2);
        assert_eq!(reader.context.metrics().snapshot().connect_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_object() {
        let backend = Arc::new(MemoryBackend::new("bucket"));
        let reader = reader(&backend, 3);

        let err = reader.read("other", ByteRange::new(0, 4)).await.unwrap_err();
        assert!(matches!(err, VfsError::ObjectNotFound(_)));
    }
}
