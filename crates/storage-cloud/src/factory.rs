//! Provider selection.
//!
//! The mount and the upload path only see the provider-neutral traits;
//! this module decides which implementations back them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use score_storage::{
    BucketResolver, ClientSettings, ExpiryUrlValidator, PartitionedBucketResolver,
    PresignedUrlValidator, S3QueryValidator, SingleBucketResolver, StorageBackend,
    StorageLocation,
};

use crate::client::S3Backend;
use crate::error::CloudError;

/// S3 interoperability endpoint of Google Cloud Storage.
pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Supported object store providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    S3,
    Gcs,
}

impl FromStr for Provider {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" | "aws" => Ok(Provider::S3),
            "gcs" | "gs" | "google" => Ok(Provider::Gcs),
            other => Err(CloudError::ConfigError(format!("unknown provider: {}", other))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::S3 => write!(f, "s3"),
            Provider::Gcs => write!(f, "gcs"),
        }
    }
}

/// Static credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Everything needed to reach one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSettings {
    pub provider: Provider,
    pub region: String,
    /// Custom endpoint (MinIO, Ceph, ...). GCS defaults to [`GCS_ENDPOINT`].
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static credentials; the default AWS chain is used when absent.
    #[serde(default)]
    pub credentials: Option<CloudCredentials>,
    pub location: StorageLocation,
    #[serde(default)]
    pub client: ClientSettings,
}

impl CloudSettings {
    /// Settings for a provider with default region and client settings.
    pub fn new(provider: Provider, location: StorageLocation) -> Self {
        Self {
            provider,
            region: "us-east-1".to_string(),
            endpoint: None,
            credentials: None,
            location,
            client: ClientSettings::default(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: CloudCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_client(mut self, client: ClientSettings) -> Self {
        self.client = client;
        self
    }

    /// Endpoint to send requests to, if not the AWS default.
    pub fn effective_endpoint(&self) -> Option<&str> {
        match (self.provider, self.endpoint.as_deref()) {
            (_, Some(endpoint)) => Some(endpoint),
            (Provider::Gcs, None) => Some(GCS_ENDPOINT),
            (Provider::S3, None) => None,
        }
    }
}

/// The provider-specific collaborators of one deployment.
#[derive(Clone)]
pub struct CloudCapabilities {
    pub backend: Arc<dyn StorageBackend>,
    pub resolver: Arc<dyn BucketResolver>,
    pub validator: Arc<dyn PresignedUrlValidator>,
}

/// Bucket naming for a provider.
pub fn resolver_for(provider: Provider, location: &StorageLocation) -> Arc<dyn BucketResolver> {
    match provider {
        Provider::S3 => Arc::new(PartitionedBucketResolver::new(location)),
        Provider::Gcs => Arc::new(SingleBucketResolver::new(location)),
    }
}

/// URL validation for a provider.
pub fn validator_for(provider: Provider) -> Arc<dyn PresignedUrlValidator> {
    match provider {
        Provider::S3 => Arc::new(S3QueryValidator::new()),
        Provider::Gcs => Arc::new(ExpiryUrlValidator::new()),
    }
}

/// Build the backend, resolver and validator for `settings.provider`.
pub async fn capabilities_for(settings: &CloudSettings) -> Result<CloudCapabilities, CloudError> {
    let resolver: Arc<dyn BucketResolver> = resolver_for(settings.provider, &settings.location);
    let backend: S3Backend = S3Backend::new(settings, resolver.clone()).await?;

    Ok(CloudCapabilities {
        backend: Arc::new(backend),
        resolver,
        validator: validator_for(settings.provider),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("S3".parse::<Provider>().unwrap(), Provider::S3);
        assert_eq!("gcs".parse::<Provider>().unwrap(), Provider::Gcs);
        assert!("azure".parse::<Provider>().is_err());
        assert_eq!(Provider::Gcs.to_string(), "gcs");
    }

    #[test]
    fn test_resolver_selection() {
        let location = StorageLocation::new("bucket").with_partition(2, 1);
        assert!(resolver_for(Provider::S3, &location).is_partitioned());
        assert!(!resolver_for(Provider::Gcs, &location).is_partitioned());
        assert_eq!(
            resolver_for(Provider::Gcs, &location).object_bucket_name("a"),
            "bucket/data"
        );
    }

    #[test]
    fn test_gcs_uses_interop_endpoint() {
        let gcs = CloudSettings::new(Provider::Gcs, StorageLocation::new("b"));
        assert_eq!(gcs.effective_endpoint(), Some(GCS_ENDPOINT));

        let s3 = CloudSettings::new(Provider::S3, StorageLocation::new("b"));
        assert_eq!(s3.effective_endpoint(), None);
        let minio = s3.with_endpoint("http://localhost:9000");
        assert_eq!(minio.effective_endpoint(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_settings_json() {
        let json: &str = r#"{
            "provider": "s3",
            "region": "us-east-1",
            "location": {"bucket": "oicr.icgc", "partition": {"poolSize": 2, "keySize": 1}}
        }"#;
        let settings: CloudSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.provider, Provider::S3);
        assert_eq!(settings.location.data_dir, "data");
        assert_eq!(settings.client.retry_limit, 10);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = CloudCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "hunter2".to_string(),
            session_token: None,
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
