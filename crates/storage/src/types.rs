//! Shared data structures for storage operations.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use score_common::{DEFAULT_DATA_DIR, DEFAULT_RETRY_LIMIT, DEFAULT_URL_EXPIRY_SECS};

/// A remote object as reported by the provider listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Globally unique object identifier. Also identifies the owning entity.
    pub id: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified: i64,
}

impl ObjectInfo {
    /// Create a new object record.
    pub fn new(id: impl Into<String>, size: u64, last_modified: i64) -> Self {
        Self {
            id: id.into(),
            size,
            last_modified,
        }
    }
}

/// Metadata record describing one file of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Identifier of the object this entity describes.
    pub id: String,
    /// Bundle identifier shared by all files of one donor/sample unit.
    pub gnos_id: String,
    /// Original file name within the bundle.
    pub file_name: String,
    /// Owning study/project code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<String>,
    /// Access tier ("open", "controlled").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

impl Entity {
    /// Create an entity with no project or access information.
    pub fn new(
        id: impl Into<String>,
        gnos_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            gnos_id: gnos_id.into(),
            file_name: file_name.into(),
            project_code: None,
            access: None,
        }
    }
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range; an `end` before `start` collapses to an empty range.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Range of `len` bytes starting at `start`.
    pub fn with_len(start: u64, len: u64) -> Self {
        Self::new(start, start.saturating_add(len))
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Clip the range to an object of `size` bytes.
    pub fn clip(&self, size: u64) -> Self {
        Self::new(self.start.min(size), self.end.min(size))
    }

    /// HTTP `Range` header value (inclusive end). `None` for empty ranges.
    pub fn header_value(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(format!("bytes={}-{}", self.start, self.end - 1))
        }
    }
}

/// Direction of a presigned transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferOperation {
    Read,
    Write,
}

/// Parameters for a presigned URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignRequest {
    /// Object the URL grants access to.
    pub object_id: String,
    /// Byte range for reads.
    pub range: Option<ByteRange>,
    /// Read or write.
    pub operation: TransferOperation,
    /// Part number for multipart writes.
    pub part_number: Option<u32>,
    /// Multipart upload the part belongs to.
    pub upload_id: Option<String>,
}

impl PresignRequest {
    /// Request a read URL for the whole object.
    pub fn read(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            range: None,
            operation: TransferOperation::Read,
            part_number: None,
            upload_id: None,
        }
    }

    /// Request a single-shot write URL.
    pub fn write(object_id: impl Into<String>) -> Self {
        Self {
            operation: TransferOperation::Write,
            ..Self::read(object_id)
        }
    }

    /// Request a write URL for one part of a multipart upload.
    pub fn write_part(
        object_id: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: u32,
    ) -> Self {
        Self {
            part_number: Some(part_number),
            upload_id: Some(upload_id.into()),
            ..Self::write(object_id)
        }
    }

    /// Restrict the request to a byte range.
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Time-limited URL issued by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    /// The signed URL.
    pub url: String,
    /// Instant after which the provider rejects the URL.
    pub expires_at: SystemTime,
}

impl PresignedUrl {
    /// Create a URL valid for `ttl` from now.
    pub fn expiring_in(url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            url: url.into(),
            expires_at: SystemTime::now() + ttl,
        }
    }

    /// True when the URL is expired at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// Client-wide transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    /// Maximum attempts for a single part upload.
    pub retry_limit: u32,
    /// Connect timeout in seconds (0 disables).
    pub connect_timeout_seconds: u64,
    /// Read timeout in seconds (0 disables).
    pub read_timeout_seconds: u64,
    /// Number of parts transferred concurrently.
    pub parallelism: usize,
    /// Lifetime requested for presigned URLs, in seconds.
    pub url_expiry_seconds: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            connect_timeout_seconds: 0,
            read_timeout_seconds: 0,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            url_expiry_seconds: DEFAULT_URL_EXPIRY_SECS,
        }
    }
}

impl ClientSettings {
    /// Set the part upload retry limit.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Set the transfer parallelism.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Connect timeout, if enabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_seconds > 0).then(|| Duration::from_secs(self.connect_timeout_seconds))
    }

    /// Read timeout, if enabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_seconds > 0).then(|| Duration::from_secs(self.read_timeout_seconds))
    }

    /// Presigned URL lifetime.
    pub fn url_expiry(&self) -> Duration {
        Duration::from_secs(self.url_expiry_seconds)
    }
}

/// Bucket partitioning of a large deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSettings {
    /// Number of physical buckets.
    pub pool_size: u32,
    /// Number of leading object id hex digits used to pick a bucket.
    pub key_size: usize,
}

/// Where objects live for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    /// Object bucket (base name when partitioned).
    pub bucket: String,
    /// Key prefix holding object data.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Partitioning, when objects are sharded across buckets.
    #[serde(default)]
    pub partition: Option<PartitionSettings>,
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

impl StorageLocation {
    /// Single-bucket location with the default data directory.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            data_dir: default_data_dir(),
            partition: None,
        }
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Shard objects across `pool_size` buckets.
    pub fn with_partition(mut self, pool_size: u32, key_size: usize) -> Self {
        self.partition = Some(PartitionSettings {
            pool_size,
            key_size,
        });
        self
    }

    /// Key of an object's data within its bucket: `"{data_dir}/{object_id}"`.
    pub fn object_key(&self, object_id: &str) -> String {
        if self.data_dir.is_empty() {
            object_id.to_string()
        } else {
            format!("{}/{}", self.data_dir, object_id)
        }
    }

    /// Recover the object id from a listed key, if it is a data key.
    pub fn object_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let id: &str = if self.data_dir.is_empty() {
            key
        } else {
            key.strip_prefix(self.data_dir.as_str())?.strip_prefix('/')?
        };
        if id.is_empty() || id.contains('/') || id.ends_with(".meta") {
            None
        } else {
            Some(id)
        }
    }
}

/// Progress update for multipart uploads.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Object being transferred.
    pub object_id: String,
    /// Parts completed so far.
    pub completed_parts: u64,
    /// Total parts of the object.
    pub total_parts: u64,
    /// Bytes completed so far.
    pub completed_bytes: u64,
    /// Object size.
    pub total_bytes: u64,
}

/// Aggregated statistics for a part transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStatistics {
    /// Parts actually transferred.
    pub parts_transferred: u64,
    /// Parts skipped because they were completed earlier.
    pub parts_skipped: u64,
    /// Bytes transferred.
    pub bytes_transferred: u64,
    /// Bytes skipped.
    pub bytes_skipped: u64,
}

impl TransferStatistics {
    /// Statistics for one skipped part.
    pub fn skipped(size: u64) -> Self {
        Self {
            parts_skipped: 1,
            bytes_skipped: size,
            ..Default::default()
        }
    }

    /// Statistics for one transferred part.
    pub fn transferred(size: u64) -> Self {
        Self {
            parts_transferred: 1,
            bytes_transferred: size,
            ..Default::default()
        }
    }

    /// Merge another statistics into this one.
    pub fn merge(&mut self, other: Self) {
        self.parts_transferred += other.parts_transferred;
        self.parts_skipped += other.parts_skipped;
        self.bytes_transferred += other.bytes_transferred;
        self.bytes_skipped += other.bytes_skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_header() {
        assert_eq!(
            ByteRange::new(0, 100).header_value().as_deref(),
            Some("bytes=0-99")
        );
        assert_eq!(ByteRange::new(5, 5).header_value(), None);
    }

    #[test]
    fn test_byte_range_clip() {
        let range = ByteRange::with_len(90, 20).clip(100);
        assert_eq!(range, ByteRange::new(90, 100));
        assert_eq!(range.len(), 10);

        let past_end = ByteRange::new(150, 200).clip(100);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_byte_range_inverted_is_empty() {
        assert!(ByteRange::new(10, 3).is_empty());
    }

    #[test]
    fn test_presign_request_builders() {
        let req = PresignRequest::write_part("obj", "upload-1", 3);
        assert_eq!(req.operation, TransferOperation::Write);
        assert_eq!(req.part_number, Some(3));
        assert_eq!(req.upload_id.as_deref(), Some("upload-1"));

        let read = PresignRequest::read("obj").with_range(ByteRange::new(0, 1));
        assert_eq!(read.operation, TransferOperation::Read);
        assert_eq!(read.range, Some(ByteRange::new(0, 1)));
    }

    #[test]
    fn test_storage_location_keys() {
        let loc = StorageLocation::new("oicr.icgc");
        assert_eq!(loc.object_key("abc"), "data/abc");
        assert_eq!(loc.object_id_from_key("data/abc"), Some("abc"));
        assert_eq!(loc.object_id_from_key("data/abc.meta"), None);
        assert_eq!(loc.object_id_from_key("upload/abc"), None);
    }

    #[test]
    fn test_entity_json_is_camel_case() {
        let json: &str = r#"{"id":"o1","gnosId":"g1","fileName":"a.bam","access":"open"}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.gnos_id, "g1");
        assert_eq!(entity.file_name, "a.bam");
        assert_eq!(entity.project_code, None);
    }

    #[test]
    fn test_transfer_statistics_merge() {
        let mut stats = TransferStatistics::transferred(100);
        stats.merge(TransferStatistics::skipped(200));

        assert_eq!(stats.parts_transferred, 1);
        assert_eq!(stats.parts_skipped, 1);
        assert_eq!(stats.bytes_transferred, 100);
        assert_eq!(stats.bytes_skipped, 200);
    }
}
