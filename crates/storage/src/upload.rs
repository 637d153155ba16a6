//! Multipart upload orchestration.
//!
//! Objects are divided with [`PartCalculator`], each part is sent through a
//! freshly presigned and validated URL, and the upload is completed once
//! every part carries its entity tag. The [`UploadProgressState`] records
//! completed parts so an interrupted upload can resume without resending
//! them.
//!
//! # Example
//!
//! ```ignore
//! use score_storage::{UploadOptions, UploadOrchestrator};
//!
//! let orchestrator = UploadOrchestrator::new(&backend, &transport, &validator)
//!     .with_options(UploadOptions::from_settings(&settings));
//! let stats = orchestrator.upload_file("object-id", path, Some(&progress)).await?;
//! ```

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use score_common::{hash_bytes, DEFAULT_RETRY_LIMIT, MIN_PART_SIZE};

use crate::error::StorageError;
use crate::parts::{Part, PartCalculator};
use crate::traits::{PartTransport, PresignedUrlValidator, ProgressCallback, StorageBackend};
use crate::types::{
    ByteRange, ClientSettings, PresignRequest, PresignedUrl, TransferProgress,
    TransferStatistics,
};

/// Default concurrency for part uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Options for upload operations.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum parts in flight.
    pub max_concurrency: usize,
    /// Attempts per part, each with a fresh URL.
    pub retry_limit: u32,
    /// Pause between attempts of one part.
    pub retry_delay: Duration,
    /// Requested minimum part size.
    pub min_part_size: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: Duration::from_millis(500),
            min_part_size: MIN_PART_SIZE,
        }
    }
}

impl UploadOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive options from client settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::default()
            .with_max_concurrency(settings.parallelism)
            .with_retry_limit(settings.retry_limit)
    }

    /// Set maximum concurrency for parallel part uploads.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Set the number of attempts per part.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Set the pause between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the requested minimum part size.
    pub fn with_min_part_size(mut self, min_part_size: u64) -> Self {
        self.min_part_size = min_part_size;
        self
    }
}

/// Resumable state of one multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressState {
    pub object_id: String,
    pub upload_id: String,
    pub object_size: u64,
    pub parts: Vec<Part>,
}

impl UploadProgressState {
    /// Parts already stored.
    pub fn completed_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_completed())
    }

    /// Parts still to send.
    pub fn remaining_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| !p.is_completed())
    }

    /// True once every part is stored.
    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(Part::is_completed)
    }

    /// Bytes already stored.
    pub fn completed_bytes(&self) -> u64 {
        self.completed_parts().map(Part::part_size).sum()
    }

    fn mark_completed(
        &mut self,
        part_number: u32,
        etag: String,
        digest: String,
    ) -> Result<(), StorageError> {
        let part: &mut Part = self
            .parts
            .iter_mut()
            .find(|p| p.part_number() == part_number)
            .ok_or_else(|| StorageError::Other {
                message: format!("Unknown part {}", part_number),
            })?;
        part.complete(etag, digest)
    }
}

/// Where part payloads are read from.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

impl UploadSource<'_> {
    /// Read the bytes of `range`.
    async fn read(&self, range: ByteRange) -> Result<Vec<u8>, StorageError> {
        match self {
            UploadSource::Bytes(data) => data
                .get(range.start as usize..range.end as usize)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| StorageError::Other {
                    message: format!(
                        "Range {}..{} exceeds source of {} bytes",
                        range.start,
                        range.end,
                        data.len()
                    ),
                }),
            UploadSource::File(path) => {
                let io_err = |e: std::io::Error| StorageError::IoError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                let mut file: tokio::fs::File =
                    tokio::fs::File::open(path).await.map_err(io_err)?;
                file.seek(SeekFrom::Start(range.start)).await.map_err(io_err)?;
                let mut buffer: Vec<u8> = vec![0u8; range.len() as usize];
                file.read_exact(&mut buffer).await.map_err(io_err)?;
                Ok(buffer)
            }
        }
    }
}

/// Drives multipart uploads through any provider implementation.
pub struct UploadOrchestrator<'a> {
    backend: &'a dyn StorageBackend,
    transport: &'a dyn PartTransport,
    validator: &'a dyn PresignedUrlValidator,
    options: UploadOptions,
}

impl<'a> UploadOrchestrator<'a> {
    /// Create a new upload orchestrator.
    ///
    /// # Arguments
    /// * `backend` - Issues URLs and manages the multipart upload
    /// * `transport` - Sends part payloads
    /// * `validator` - Checks every URL before use
    pub fn new(
        backend: &'a dyn StorageBackend,
        transport: &'a dyn PartTransport,
        validator: &'a dyn PresignedUrlValidator,
    ) -> Self {
        Self {
            backend,
            transport,
            validator,
            options: UploadOptions::default(),
        }
    }

    /// Set upload options.
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Divide the object and open a multipart upload for it.
    ///
    /// A zero-length object has no parts and no multipart upload; its
    /// `upload_id` stays empty and `resume` stores it with a single PUT.
    pub async fn begin(
        &self,
        object_id: &str,
        object_size: u64,
    ) -> Result<UploadProgressState, StorageError> {
        let size: i64 = i64::try_from(object_size).map_err(|_| StorageError::InvalidSize {
            size: i64::MAX,
        })?;
        let parts: Vec<Part> = PartCalculator::new(self.options.min_part_size).divide(size)?;
        if parts.is_empty() {
            return Ok(UploadProgressState {
                object_id: object_id.to_string(),
                upload_id: String::new(),
                object_size,
                parts,
            });
        }

        let upload_id: String = self.backend.initiate_multipart(object_id).await?;
        debug!(
            "Started upload {} of {} in {} parts",
            upload_id,
            object_id,
            parts.len()
        );

        Ok(UploadProgressState {
            object_id: object_id.to_string(),
            upload_id,
            object_size,
            parts,
        })
    }

    /// Upload an in-memory object.
    ///
    /// The multipart upload is aborted if any part fails for good.
    pub async fn upload_bytes(
        &self,
        object_id: &str,
        data: &[u8],
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<TransferStatistics, StorageError> {
        self.upload_new(object_id, data.len() as u64, UploadSource::Bytes(data), progress)
            .await
    }

    /// Upload a local file.
    ///
    /// The multipart upload is aborted if any part fails for good.
    pub async fn upload_file(
        &self,
        object_id: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<TransferStatistics, StorageError> {
        let size: u64 = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::IoError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .len();
        self.upload_new(object_id, size, UploadSource::File(path), progress)
            .await
    }

    async fn upload_new(
        &self,
        object_id: &str,
        size: u64,
        source: UploadSource<'_>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<TransferStatistics, StorageError> {
        let mut state: UploadProgressState = self.begin(object_id, size).await?;

        match self.resume(&mut state, source, progress).await {
            Ok(stats) => Ok(stats),
            Err(e) if state.upload_id.is_empty() => Err(e),
            Err(e) => {
                warn!("Upload of {} failed, aborting: {}", object_id, e);
                if let Err(abort_err) = self
                    .backend
                    .abort_multipart(object_id, &state.upload_id)
                    .await
                {
                    warn!("Failed to abort upload {}: {}", state.upload_id, abort_err);
                }
                Err(e)
            }
        }
    }

    /// Send every part not yet completed, then complete the upload.
    ///
    /// On failure `state` keeps the parts that did complete, so calling
    /// `resume` again sends only the rest. The upload is not aborted.
    ///
    /// # Returns
    /// Statistics with completed parts from earlier runs counted as skipped.
    pub async fn resume(
        &self,
        state: &mut UploadProgressState,
        source: UploadSource<'_>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<TransferStatistics, StorageError> {
        if state.parts.is_empty() {
            return self.put_empty(&state.object_id).await;
        }

        let mut stats: TransferStatistics = TransferStatistics::default();
        for part in state.completed_parts() {
            stats.merge(TransferStatistics::skipped(part.part_size()));
        }

        let pending: Vec<Part> = state.remaining_parts().cloned().collect();
        let total_parts: u64 = state.parts.len() as u64;
        let object_id: String = state.object_id.clone();
        let upload_id: String = state.upload_id.clone();

        let mut results = stream::iter(pending)
            .map(|part| {
                let object_id: &str = &object_id;
                let upload_id: &str = &upload_id;
                async move {
                    let result = self.transfer_part(object_id, upload_id, &part, source).await;
                    (part, result)
                }
            })
            .buffer_unordered(self.options.max_concurrency.max(1));

        while let Some((part, result)) = results.next().await {
            let (etag, digest) = result?;
            state.mark_completed(part.part_number(), etag, digest)?;
            stats.merge(TransferStatistics::transferred(part.part_size()));

            if let Some(cb) = progress {
                let update: TransferProgress = TransferProgress {
                    object_id: object_id.clone(),
                    completed_parts: state.completed_parts().count() as u64,
                    total_parts,
                    completed_bytes: state.completed_bytes(),
                    total_bytes: state.object_size,
                };
                if !cb.on_progress(&update) {
                    return Err(StorageError::Cancelled);
                }
            }
        }
        drop(results);

        self.backend
            .complete_multipart(&state.object_id, &state.upload_id, &state.parts)
            .await?;
        info!(
            "Uploaded {} ({} parts sent, {} skipped)",
            state.object_id, stats.parts_transferred, stats.parts_skipped
        );

        Ok(stats)
    }

    /// Store a zero-length object with one plain PUT.
    ///
    /// Multipart completion with no parts is rejected by S3.
    async fn put_empty(&self, object_id: &str) -> Result<TransferStatistics, StorageError> {
        let request: PresignRequest = PresignRequest::write(object_id);
        self.put_with_retry(&request, &[]).await?;
        info!("Uploaded empty object {}", object_id);
        Ok(TransferStatistics::default())
    }

    /// Send one part, retrying with a fresh URL on retryable failures.
    ///
    /// # Returns
    /// The entity tag and payload digest.
    async fn transfer_part(
        &self,
        object_id: &str,
        upload_id: &str,
        part: &Part,
        source: UploadSource<'_>,
    ) -> Result<(String, String), StorageError> {
        let data: Vec<u8> = source.read(part.range()).await?;
        let digest: String = hash_bytes(&data);
        let request: PresignRequest =
            PresignRequest::write_part(object_id, upload_id, part.part_number());
        let etag: String = self.put_with_retry(&request, &data).await?;
        Ok((etag, digest))
    }

    /// PUT `data` through a URL presigned for `request`, presigning again
    /// before every attempt.
    ///
    /// # Returns
    /// The entity tag of the stored payload.
    async fn put_with_retry(
        &self,
        request: &PresignRequest,
        data: &[u8],
    ) -> Result<String, StorageError> {
        let max_attempts: u32 = self.options.retry_limit.max(1);

        let mut attempt: u32 = 1;
        loop {
            match self.put_once(request, data).await {
                Ok(etag) => return Ok(etag),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Write of {} (part {:?}) failed (attempt {}/{}): {}",
                        request.object_id, request.part_number, attempt, max_attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn put_once(&self, request: &PresignRequest, data: &[u8]) -> Result<String, StorageError> {
        let url: PresignedUrl = self.backend.presigned_url(request).await?;
        if !self.validator.validate(&url) {
            return Err(StorageError::UntrustedUrl {
                object_id: request.object_id.clone(),
            });
        }
        self.transport.put_part(&url, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::validator::S3QueryValidator;
    use score_common::MIB;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Cancels after a fixed number of completed parts.
    struct StopAfter {
        parts: u64,
        calls: AtomicU64,
    }

    impl ProgressCallback for StopAfter {
        fn on_progress(&self, progress: &TransferProgress) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.completed_parts < self.parts
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn options() -> UploadOptions {
        UploadOptions::default()
            .with_max_concurrency(1)
            .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn test_options_from_settings() {
        let settings: ClientSettings = ClientSettings::default()
            .with_parallelism(3)
            .with_retry_limit(4);
        let options: UploadOptions = UploadOptions::from_settings(&settings);
        assert_eq!(options.max_concurrency, 3);
        assert_eq!(options.retry_limit, 4);
        assert_eq!(UploadOptions::default().retry_limit, 10);
    }

    #[tokio::test]
    async fn test_upload_bytes_multipart() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        let data: Vec<u8> = sample((41 * MIB) as usize);

        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator)
            .with_options(options().with_max_concurrency(3));
        let stats = orchestrator.upload_bytes("obj", &data, None).await.unwrap();

        assert_eq!(stats.parts_transferred, 3);
        assert_eq!(stats.bytes_transferred, 41 * MIB);
        assert_eq!(backend.object_data("obj").unwrap(), data);
        assert_eq!(backend.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_upload_empty_object() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator);

        let stats = orchestrator.upload_bytes("empty", &[], None).await.unwrap();

        assert_eq!(stats, TransferStatistics::default());
        assert_eq!(backend.object_data("empty").unwrap(), Vec::<u8>::new());
        // One plain PUT, no multipart upload opened or completed.
        assert_eq!(backend.presign_calls(), 1);
        assert_eq!(backend.put_calls(), 1);
        assert_eq!(backend.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_empty_object_state_has_no_upload() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        backend.fail_next_puts(1);
        let orchestrator =
            UploadOrchestrator::new(&backend, &backend, &validator).with_options(options());

        let mut state: UploadProgressState = orchestrator.begin("empty", 0).await.unwrap();
        assert!(state.upload_id.is_empty());
        assert!(state.parts.is_empty());
        assert_eq!(backend.pending_uploads(), 0);

        orchestrator
            .resume(&mut state, UploadSource::Bytes(&[]), None)
            .await
            .unwrap();

        // The failed PUT was retried with a fresh URL.
        assert_eq!(backend.presign_calls(), 2);
        assert_eq!(backend.put_calls(), 2);
        assert_eq!(backend.object_data("empty").unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_part_retries_use_fresh_urls() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        backend.fail_next_puts(1);
        backend.issue_untrusted_urls(1);

        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator)
            .with_options(options().with_retry_limit(3));
        orchestrator
            .upload_bytes("obj", b"small payload", None)
            .await
            .unwrap();

        // Untrusted URL never reaches the transport; the failed put and the
        // successful one each used their own URL.
        assert_eq!(backend.presign_calls(), 3);
        assert_eq!(backend.put_calls(), 2);
        assert_eq!(backend.object_data("obj").unwrap(), b"small payload");
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_upload() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        backend.fail_next_puts(10);

        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator)
            .with_options(options().with_retry_limit(2));
        let err = orchestrator
            .upload_bytes("obj", b"payload", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::NetworkError { .. }));
        assert_eq!(backend.put_calls(), 2);
        assert_eq!(backend.pending_uploads(), 0);
        assert!(backend.object_data("obj").is_none());
    }

    #[tokio::test]
    async fn test_resume_skips_completed_parts() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        let data: Vec<u8> = sample((41 * MIB) as usize);
        let orchestrator =
            UploadOrchestrator::new(&backend, &backend, &validator).with_options(options());

        let mut state: UploadProgressState =
            orchestrator.begin("obj", data.len() as u64).await.unwrap();
        assert_eq!(state.parts.len(), 3);

        let stop = StopAfter {
            parts: 1,
            calls: AtomicU64::new(0),
        };
        let err = orchestrator
            .resume(&mut state, UploadSource::Bytes(&data), Some(&stop))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Cancelled);
        assert_eq!(state.completed_parts().count(), 1);
        assert_eq!(backend.put_calls(), 1);

        // State survives serialization between runs.
        let saved: String = serde_json::to_string(&state).unwrap();
        let mut restored: UploadProgressState = serde_json::from_str(&saved).unwrap();

        let stats = orchestrator
            .resume(&mut restored, UploadSource::Bytes(&data), None)
            .await
            .unwrap();

        assert_eq!(stats.parts_skipped, 1);
        assert_eq!(stats.parts_transferred, 2);
        assert_eq!(backend.put_calls(), 3);
        assert!(restored.is_complete());
        assert_eq!(backend.object_data("obj").unwrap(), data);
    }

    #[tokio::test]
    async fn test_upload_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reads.bam");
        let data: Vec<u8> = sample(4096);
        std::fs::write(&path, &data).unwrap();

        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator);

        let stats = orchestrator.upload_file("obj", &path, None).await.unwrap();

        assert_eq!(stats.bytes_transferred, 4096);
        assert_eq!(backend.object_data("obj").unwrap(), data);
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let backend = MemoryBackend::new("bucket");
        let validator = S3QueryValidator::new();
        let orchestrator = UploadOrchestrator::new(&backend, &backend, &validator);

        let err = orchestrator
            .upload_file("obj", Path::new("/nonexistent/reads.bam"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IoError { .. }));
    }

    #[test]
    fn test_digest_recorded_on_completion() {
        let mut state = UploadProgressState {
            object_id: "obj".to_string(),
            upload_id: "u".to_string(),
            object_size: 3,
            parts: vec![Part::new(1, 3, 0)],
        };
        state
            .mark_completed(1, "etag".to_string(), hash_bytes(b"abc"))
            .unwrap();
        assert_eq!(state.parts[0].digest(), Some(hash_bytes(b"abc").as_str()));
        assert!(state.is_complete());
    }
}
