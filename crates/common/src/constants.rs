//! Shared constants used across the score filesystem crates.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Maximum number of parts a provider accepts for one multipart transfer.
pub const MAX_PARTS: u64 = 10_000;

/// Smallest part size handed to a provider (20 MiB).
/// Configured minimums below this value are raised to it.
pub const MIN_PART_SIZE: u64 = 20 * MIB;

/// Default retry limit for part uploads.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Default number of attempts for a single ranged read.
pub const DEFAULT_READ_ATTEMPTS: u32 = 3;

/// Default lifetime of a presigned URL in seconds.
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 60 * 60;

/// Directory (key prefix) holding object data inside a bucket.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Name the filesystem reports to the kernel.
pub const FS_NAME: &str = "score";
