//! Configuration options for the VFS.
//!
//! This module provides configuration for kernel caching, the ranged read
//! path and the options passed to the host mount.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::warn;

use score_common::{DEFAULT_READ_ATTEMPTS, FS_NAME};

/// Configuration options for the VFS.
///
/// # Example
///
/// ```ignore
/// let options = VfsOptions::default()
///     .with_read(ReadOptions::default().with_max_attempts(5))
///     .with_mount(MountOptions::parse("allow_other,uid=1000"));
///
/// let vfs = VirtualFileSystem::new(context, options);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VfsOptions {
    /// Kernel cache settings.
    pub kernel_cache: KernelCacheOptions,
    /// Ranged read behavior.
    pub read: ReadOptions,
    /// User mount options, merged with the fixed internal set at mount time.
    pub mount: MountOptions,
}

impl VfsOptions {
    /// Set kernel cache options.
    ///
    /// # Arguments
    /// * `kernel_cache` - Kernel cache configuration
    pub fn with_kernel_cache(mut self, kernel_cache: KernelCacheOptions) -> Self {
        self.kernel_cache = kernel_cache;
        self
    }

    /// Set read options.
    ///
    /// # Arguments
    /// * `read` - Read retry configuration
    pub fn with_read(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }

    /// Set user mount options.
    ///
    /// # Arguments
    /// * `mount` - Options supplied by the user
    pub fn with_mount(mut self, mount: MountOptions) -> Self {
        self.mount = mount;
        self
    }
}

// ============================================================================
// Kernel Cache Options
// ============================================================================

/// Options for kernel-level caching (FUSE).
///
/// Mounted objects are immutable for the lifetime of a mount, so long
/// timeouts are safe.
#[derive(Debug, Clone)]
pub struct KernelCacheOptions {
    /// Attribute cache timeout in seconds.
    pub attr_timeout_secs: u64,

    /// Entry cache timeout in seconds.
    pub entry_timeout_secs: u64,
}

impl Default for KernelCacheOptions {
    fn default() -> Self {
        Self {
            attr_timeout_secs: 86400,  // 24 hours
            entry_timeout_secs: 86400, // 24 hours
        }
    }
}

impl KernelCacheOptions {
    /// Create options with no kernel caching.
    pub fn no_cache() -> Self {
        Self {
            attr_timeout_secs: 0,
            entry_timeout_secs: 0,
        }
    }

    /// Attribute cache timeout.
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_timeout_secs)
    }

    /// Entry cache timeout.
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }
}

// ============================================================================
// Read Options
// ============================================================================

/// Retry behavior of ranged reads.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Attempts per read, each with a freshly presigned URL.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_READ_ATTEMPTS,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl ReadOptions {
    /// Set the number of attempts (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the pause between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

// ============================================================================
// Mount Options
// ============================================================================

/// Options the filesystem always mounts with. Users cannot override them.
pub const INTERNAL_MOUNT_OPTIONS: [(&str, Option<&str>); 4] = [
    ("ro", None),
    ("fsname", Some(FS_NAME)),
    ("default_permissions", None),
    ("noatime", None),
];

/// Host mount options: flags (`ro`) and key/value pairs (`uid=1000`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    entries: BTreeMap<String, Option<String>>,
}

impl MountOptions {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed internal option set.
    pub fn internal() -> Self {
        let mut options: MountOptions = Self::new();
        for (key, value) in INTERNAL_MOUNT_OPTIONS {
            options.entries.insert(key.to_string(), value.map(str::to_string));
        }
        options
    }

    /// Parse a `"k=v,flag"` string. Blank items are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut options: MountOptions = Self::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some((key, value)) => options.insert(key.trim(), Some(value.trim())),
                None => options.insert(item, None),
            }
        }
        options
    }

    /// Add or replace an option.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<&str>) {
        self.entries.insert(key.into(), value.map(str::to_string));
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Value of an option. `Some(None)` for a flag.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(|v| v.as_deref())
    }

    /// True if the option is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Internal options plus every user option that does not collide with one.
    ///
    /// # Arguments
    /// * `user` - Options supplied by the user
    pub fn merge(user: &MountOptions) -> MountOptions {
        let mut merged: MountOptions = Self::internal();
        for (key, value) in user.iter() {
            if merged.contains(key) {
                warn!("Ignoring mount option {}: set internally", key);
                continue;
            }
            merged.insert(key, value);
        }
        merged
    }
}

impl fmt::Display for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first: bool = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            match value {
                Some(value) => write!(f, "{}={}", key, value)?,
                None => write!(f, "{}", key)?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts: VfsOptions = VfsOptions::default();
        assert_eq!(opts.read.max_attempts, 3);
        assert_eq!(opts.kernel_cache.attr_timeout_secs, 86400);
        assert!(opts.mount.is_empty());
    }

    #[test]
    fn test_builder_pattern() {
        let opts: VfsOptions = VfsOptions::default()
            .with_read(ReadOptions::default().with_max_attempts(0))
            .with_kernel_cache(KernelCacheOptions::no_cache());

        assert_eq!(opts.read.max_attempts, 1);
        assert_eq!(opts.kernel_cache.entry_ttl(), Duration::ZERO);
    }

    #[test]
    fn test_parse() {
        let opts: MountOptions = MountOptions::parse("allow_other, uid=1000,,gid = 20");
        assert_eq!(opts.get("allow_other"), Some(None));
        assert_eq!(opts.get("uid"), Some(Some("1000")));
        assert_eq!(opts.get("gid"), Some(Some("20")));
        assert_eq!(opts.len(), 3);
    }

    #[test]
    fn test_merge_keeps_internal_options() {
        let user: MountOptions = MountOptions::parse("fsname=mine,allow_other,ro");
        let merged: MountOptions = MountOptions::merge(&user);

        assert_eq!(merged.get("fsname"), Some(Some("score")));
        assert_eq!(merged.get("allow_other"), Some(None));
        assert!(merged.contains("ro"));
        assert!(merged.contains("noatime"));
        assert!(merged.contains("default_permissions"));
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_display() {
        let opts: MountOptions = MountOptions::new()
            .with("uid", Some("1000"))
            .with("allow_other", None);
        assert_eq!(opts.to_string(), "allow_other,uid=1000");
    }
}
