//! Metadata cache backend trait.

use async_trait::async_trait;

use super::error::MetadataCacheError;
use super::CacheKind;

/// Pluggable storage for serialized metadata listings.
///
/// The index treats every error as a cache miss (on load) or logs it
/// (on store); backends do not need their own recovery.
#[async_trait]
pub trait MetadataCacheBackend: Send + Sync {
    /// Load the payload cached for `kind`.
    ///
    /// # Returns
    /// `None` if nothing is cached.
    async fn load(&self, kind: CacheKind) -> Result<Option<String>, MetadataCacheError>;

    /// Replace the payload cached for `kind`.
    async fn store(&self, kind: CacheKind, payload: &str) -> Result<(), MetadataCacheError>;

    /// Remove the payload cached for `kind`, if any.
    async fn remove(&self, kind: CacheKind) -> Result<(), MetadataCacheError>;
}
