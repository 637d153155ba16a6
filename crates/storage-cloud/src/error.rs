//! Error types for cloud storage operations.

use score_storage::StorageError;
use thiserror::Error;

/// Errors specific to the cloud backends and HTTP clients.
#[derive(Error, Debug)]
pub enum CloudError {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// Enumerating a bucket failed.
    #[error("Listing {bucket} failed: {message}")]
    ListingFailed { bucket: String, message: String },

    /// HTTP transport error. Never carries the request URL.
    #[error("HTTP error: {message}")]
    Http { message: String, retryable: bool },

    /// Unexpected HTTP status.
    #[error("Unexpected HTTP status {status} for {object_id}")]
    Status { status: u16, object_id: String },

    /// Response body did not decode.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CloudError {
    pub(crate) fn sdk(err: impl std::fmt::Display, retryable: bool) -> Self {
        CloudError::SdkError {
            message: err.to_string(),
            retryable,
        }
    }

    pub(crate) fn http(err: reqwest::Error) -> Self {
        let retryable: bool = err.is_timeout() || err.is_connect() || err.is_request();
        CloudError::Http {
            message: err.without_url().to_string(),
            retryable,
        }
    }
}

impl From<CloudError> for StorageError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::SdkError { message, retryable } | CloudError::Http { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            CloudError::ListingFailed { bucket, message } => StorageError::BackendUnavailable {
                message: format!("{}: {}", bucket, message),
            },
            CloudError::Status { status: 404, object_id } => StorageError::NotFound {
                bucket: String::new(),
                key: object_id,
            },
            CloudError::Status {
                status: status @ (401 | 403),
                object_id,
            } => StorageError::AccessDenied {
                bucket: String::new(),
                key: object_id,
                message: format!("HTTP {}", status),
            },
            CloudError::Status { status, object_id } => StorageError::NetworkError {
                message: format!("HTTP {} for {}", status, object_id),
                retryable: status >= 500 || status == 429,
            },
            CloudError::InvalidResponse(message) => StorageError::Serialization { message },
            CloudError::ConfigError(message) => StorageError::InvalidConfig { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: StorageError = CloudError::Status {
            status: 404,
            object_id: "abc".to_string(),
        }
        .into();
        assert!(matches!(not_found, StorageError::NotFound { .. }));

        let denied: StorageError = CloudError::Status {
            status: 403,
            object_id: "abc".to_string(),
        }
        .into();
        assert!(matches!(denied, StorageError::AccessDenied { .. }));

        let unavailable: StorageError = CloudError::Status {
            status: 503,
            object_id: "abc".to_string(),
        }
        .into();
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_listing_failure_is_backend_unavailable() {
        let err: StorageError = CloudError::ListingFailed {
            bucket: "b".to_string(),
            message: "timeout".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::BackendUnavailable { .. }));
    }
}
