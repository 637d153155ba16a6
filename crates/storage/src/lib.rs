//! Provider-neutral storage layer for the score object filesystem.
//!
//! This crate holds everything between the mount and a concrete cloud
//! provider:
//!
//! - **Parts** - deterministic division of objects into multipart segments
//! - **Traits** - `StorageBackend`, `BucketResolver`, `PresignedUrlValidator`
//!   and the transfer collaborators implemented per provider
//! - **Metadata index** - entity and object listings with optional caching
//! - **Manifest filter** - narrowing a listing to a user's manifest
//! - **Upload orchestrator** - resumable, parallel multipart uploads
//!
//! Concrete S3/GCS implementations live in `score-storage-cloud`. The
//! in-memory `MemoryBackend` used by tests is built only with the
//! `test-support` feature.

mod error;
pub mod manifest;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod metadata;
mod parts;
mod resolver;
mod traits;
mod types;
mod upload;
mod validator;

pub use error::StorageError;
pub use manifest::{filter_objects, Manifest, ManifestEntry, ManifestFilter};
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBackend;
pub use metadata::{
    CacheKind, FileMetadataCache, MetadataCacheBackend, MetadataCacheError,
    MetadataCacheSettings, MetadataIndex,
};
pub use parts::{Part, PartCalculator};
pub use resolver::{split_bucket_name, PartitionedBucketResolver, SingleBucketResolver};
pub use traits::{
    BucketResolver, EntitySource, PartTransport, PresignedUrlValidator, ProgressCallback,
    RangeFetcher, StorageBackend,
};
pub use types::{
    ByteRange, ClientSettings, Entity, ObjectInfo, PartitionSettings,
    PresignRequest, PresignedUrl, StorageLocation, TransferOperation, TransferProgress,
    TransferStatistics,
};
pub use upload::{
    UploadOptions, UploadOrchestrator, UploadProgressState, UploadSource,
    DEFAULT_UPLOAD_CONCURRENCY,
};
pub use validator::{ExpiryUrlValidator, S3QueryValidator};
