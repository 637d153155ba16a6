//! Error types for the VFS crate.

use std::fmt;

use score_storage::StorageError;

use crate::session::MountState;

/// Errors that can occur during VFS operations.
#[derive(Debug)]
pub enum VfsError {
    /// Inode not found.
    InodeNotFound(u64),

    /// Not a directory.
    NotADirectory(u64),

    /// Not a regular file.
    NotAFile(u64),

    /// Object is not part of the mounted set.
    ObjectNotFound(String),

    /// Ranged read failed on every attempt.
    ReadFailure {
        object_id: String,
        attempts: u32,
        source: StorageError,
    },

    /// Illegal mount session transition.
    InvalidState { from: MountState, to: MountState },

    /// Mount operation failed.
    MountFailed(String),

    /// Storage layer error.
    Storage(StorageError),
}

impl VfsError {
    /// errno reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::InodeNotFound(_) | VfsError::ObjectNotFound(_) => libc::ENOENT,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::NotAFile(_) => libc::EISDIR,
            VfsError::Storage(StorageError::AccessDenied { .. }) => libc::EACCES,
            VfsError::ReadFailure { .. } | VfsError::Storage(_) => libc::EIO,
            VfsError::InvalidState { .. } | VfsError::MountFailed(_) => libc::EIO,
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::InodeNotFound(id) => write!(f, "Inode not found: {}", id),
            VfsError::NotADirectory(id) => write!(f, "Not a directory: {}", id),
            VfsError::NotAFile(id) => write!(f, "Not a file: {}", id),
            VfsError::ObjectNotFound(id) => write!(f, "Object not mounted: {}", id),
            VfsError::ReadFailure {
                object_id,
                attempts,
                source,
            } => write!(
                f,
                "Read of {} failed after {} attempts: {}",
                object_id, attempts, source
            ),
            VfsError::InvalidState { from, to } => {
                write!(f, "Invalid mount state transition: {} -> {}", from, to)
            }
            VfsError::MountFailed(msg) => write!(f, "Mount failed: {}", msg),
            VfsError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::ReadFailure { source, .. } => Some(source),
            VfsError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for VfsError {
    fn from(err: StorageError) -> Self {
        VfsError::Storage(err)
    }
}
