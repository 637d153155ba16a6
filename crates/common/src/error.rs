//! Shared error types used across the score filesystem crates.

use thiserror::Error;

/// Path precondition errors shared across crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Path does not exist.
    #[error("Path does not exist: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// Path exists but is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// Directory has entries in it.
    #[error("Directory is not empty: {path}")]
    NotEmpty {
        /// The offending directory.
        path: String,
    },

    /// Current user may not traverse the directory.
    #[error("Directory is not executable by the current user: {path}")]
    NotExecutable {
        /// The offending directory.
        path: String,
    },

    /// IO error occurred while accessing path.
    #[error("IO error at {path}: {message}")]
    IoError {
        /// Path where error occurred.
        path: String,
        /// Error message.
        message: String,
    },
}

impl PathError {
    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// The path this error refers to.
    pub fn path(&self) -> &str {
        match self {
            PathError::NotFound { path }
            | PathError::NotADirectory { path }
            | PathError::NotEmpty { path }
            | PathError::NotExecutable { path }
            | PathError::IoError { path, .. } => path,
        }
    }
}
