//! Error types for mount orchestration.

use score_common::PathError;
use score_storage::StorageError;
use score_vfs::VfsError;
use thiserror::Error;

/// Errors that abort a mount.
#[derive(Debug, Error)]
pub enum MountError {
    /// Mount point failed validation. Raised before any remote call.
    #[error("Invalid mount point: {0}")]
    Target(#[from] PathError),

    /// Entity or object listing could not be resolved.
    #[error("Failed to index storage: {0}")]
    Indexing(#[from] StorageError),

    /// Host mount or unmount failed.
    #[error("Mount failed: {0}")]
    Mount(#[from] VfsError),
}
