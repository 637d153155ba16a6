//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Part division was asked to split a negative size.
    #[error("Invalid object size for part division: {size}")]
    InvalidSize { size: i64 },

    /// Remote enumeration failed.
    #[error("Storage backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// Presigned URL failed validation.
    #[error("Untrusted presigned URL for object {object_id}")]
    UntrustedUrl { object_id: String },

    /// Object not found in the remote store.
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied.
    #[error("Access denied to {bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Operation cancelled by user.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A part already carries its completion tag.
    #[error("Part {part_number} is already completed")]
    PartAlreadyCompleted { part_number: u32 },

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if a fresh attempt (with a fresh presigned URL) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::UntrustedUrl { .. } => true,
            StorageError::BackendUnavailable { .. } => true,
            StorageError::InvalidSize { .. } => false,
            StorageError::NotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::Cancelled => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::PartAlreadyCompleted { .. } => false,
            StorageError::Serialization { .. } => false,
            StorageError::Other { .. } => false,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::UntrustedUrl {
            object_id: "a".into()
        }
        .is_retryable());
        assert!(StorageError::NetworkError {
            message: "reset".into(),
            retryable: true
        }
        .is_retryable());
        assert!(!StorageError::NetworkError {
            message: "bad request".into(),
            retryable: false
        }
        .is_retryable());
        assert!(!StorageError::InvalidSize { size: -1 }.is_retryable());
        assert!(!StorageError::NotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_retryable());
    }
}
