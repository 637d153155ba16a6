//! Collaborator traits at the provider boundary.
//!
//! Everything above this module is provider-agnostic: concrete S3/GCS and
//! HTTP implementations live in `score-storage-cloud`, an in-memory fake
//! in [`crate::memory`].

use async_trait::async_trait;

use crate::error::StorageError;
use crate::parts::Part;
use crate::types::{ByteRange, Entity, ObjectInfo, PresignRequest, PresignedUrl, TransferProgress};

/// Callback trait for progress reporting.
pub trait ProgressCallback: Send + Sync {
    /// Called with progress updates.
    /// Returns false to cancel the operation.
    fn on_progress(&self, progress: &TransferProgress) -> bool;
}

/// Remote object store of one provider.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Enumerate every data object.
    ///
    /// Transport failures surface as `StorageError::BackendUnavailable`,
    /// never as an empty listing.
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, StorageError>;

    /// Issue a time-limited URL for a read or write.
    async fn presigned_url(&self, request: &PresignRequest)
        -> Result<PresignedUrl, StorageError>;

    /// Start a multipart upload and return its upload id.
    async fn initiate_multipart(&self, object_id: &str) -> Result<String, StorageError>;

    /// Finish a multipart upload. Every part must be completed.
    async fn complete_multipart(
        &self,
        object_id: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<(), StorageError>;

    /// Abandon a multipart upload.
    async fn abort_multipart(&self, object_id: &str, upload_id: &str)
        -> Result<(), StorageError>;
}

/// Maps object ids to physical bucket names.
pub trait BucketResolver: Send + Sync {
    /// Bucket holding the object's data.
    fn object_bucket_name(&self, object_id: &str) -> String;

    /// True when objects are sharded across several buckets.
    fn is_partitioned(&self) -> bool;

    /// Every bucket that must be enumerated to list all objects.
    fn listing_buckets(&self) -> Vec<String>;
}

/// Sanity check applied to every presigned URL before it is used.
pub trait PresignedUrlValidator: Send + Sync {
    /// Returns false if the URL must not be trusted.
    fn validate(&self, url: &PresignedUrl) -> bool;
}

/// Performs a ranged GET against a presigned URL.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch the bytes of `range` from `url`.
    async fn fetch(&self, url: &PresignedUrl, range: ByteRange) -> Result<Vec<u8>, StorageError>;
}

/// Performs a part PUT against a presigned URL.
#[async_trait]
pub trait PartTransport: Send + Sync {
    /// Store `data` and return the provider's entity tag.
    async fn put_part(&self, url: &PresignedUrl, data: &[u8]) -> Result<String, StorageError>;
}

/// Metadata server listing of entities.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetch every entity.
    async fn entities(&self) -> Result<Vec<Entity>, StorageError>;
}
