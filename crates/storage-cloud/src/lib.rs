//! Cloud provider implementations of the score storage traits.
//!
//! - [`S3Backend`] - listing, presigning and multipart control through the
//!   AWS SDK; GCS is reached through its S3 interoperability endpoint
//! - [`HttpTransport`] - ranged GETs and part PUTs against presigned URLs
//! - [`HttpEntitySource`] - the metadata server's entity listing
//! - [`capabilities_for`] - picks the implementations for a provider
//!
//! # Example
//!
//! ```ignore
//! use score_storage::StorageLocation;
//! use score_storage_cloud::{capabilities_for, CloudSettings, Provider};
//!
//! let settings = CloudSettings::new(Provider::S3, StorageLocation::new("oicr.icgc"));
//! let caps = capabilities_for(&settings).await?;
//! let objects = caps.backend.list_objects().await?;
//! ```

mod client;
mod error;
mod factory;
mod http;
mod metadata;

pub use client::S3Backend;
pub use error::CloudError;
pub use factory::{
    capabilities_for, resolver_for, validator_for, CloudCapabilities, CloudCredentials,
    CloudSettings, Provider, GCS_ENDPOINT,
};
pub use http::HttpTransport;
pub use metadata::{HttpEntitySource, DEFAULT_PAGE_SIZE};
