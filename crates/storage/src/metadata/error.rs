//! Metadata cache error types.

use thiserror::Error;

/// Errors raised by a metadata cache backend.
#[derive(Error, Debug)]
pub enum MetadataCacheError {
    /// I/O error on the cache artifact.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Artifact exists but does not decode.
    #[error("Corrupt cache artifact {name}: {message}")]
    Corrupt { name: String, message: String },
}
