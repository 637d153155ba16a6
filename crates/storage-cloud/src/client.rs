//! AWS SDK S3 backend, also used for GCS through its S3 interoperability API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use tracing::debug;

use score_storage::{
    split_bucket_name, BucketResolver, ObjectInfo, Part, PresignRequest, PresignedUrl,
    StorageBackend, StorageError, StorageLocation, TransferOperation,
};

use crate::error::CloudError;
use crate::factory::CloudSettings;

/// StorageBackend implementation using AWS SDK for Rust.
///
/// URLs are signed locally with the configured credentials; object bytes
/// never pass through this client.
pub struct S3Backend {
    /// The underlying S3 client.
    s3_client: S3Client,
    /// Maps object ids to buckets.
    resolver: Arc<dyn BucketResolver>,
    /// Data directory and bucket layout.
    location: StorageLocation,
    /// Lifetime of issued URLs.
    url_expiry: Duration,
}

impl S3Backend {
    /// Create a backend with the default credential chain, or the
    /// credentials in `settings`.
    ///
    /// # Arguments
    /// * `settings` - Region, endpoint, credentials and bucket layout
    /// * `resolver` - Bucket naming for the provider
    pub async fn new(
        settings: &CloudSettings,
        resolver: Arc<dyn BucketResolver>,
    ) -> Result<Self, CloudError> {
        let mut timeouts = TimeoutConfig::builder();
        if let Some(timeout) = settings.client.connect_timeout() {
            timeouts = timeouts.connect_timeout(timeout);
        }
        if let Some(timeout) = settings.client.read_timeout() {
            timeouts = timeouts.read_timeout(timeout);
        }

        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()))
            .timeout_config(timeouts.build());

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "score",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = settings.effective_endpoint() {
            debug!("Using storage endpoint {}", endpoint);
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }
        let s3_client = S3Client::from_conf(s3_config.build());

        Ok(Self::from_client(
            s3_client,
            resolver,
            settings.location.clone(),
            settings.client.url_expiry(),
        ))
    }

    /// Create a backend from an existing S3Client.
    pub fn from_client(
        s3_client: S3Client,
        resolver: Arc<dyn BucketResolver>,
        location: StorageLocation,
        url_expiry: Duration,
    ) -> Self {
        Self {
            s3_client,
            resolver,
            location,
            url_expiry,
        }
    }

    /// Physical bucket and key of an object.
    fn object_location(&self, object_id: &str) -> (String, String) {
        let name: String = self.resolver.object_bucket_name(object_id);
        let (bucket, _) = split_bucket_name(&name);
        (bucket.to_string(), self.location.object_key(object_id))
    }

    fn presigning_config(&self) -> Result<PresigningConfig, CloudError> {
        PresigningConfig::expires_in(self.url_expiry)
            .map_err(|e| CloudError::ConfigError(e.to_string()))
    }

    async fn list_bucket(&self, name: &str) -> Result<Vec<ObjectInfo>, CloudError> {
        let (bucket, _) = split_bucket_name(name);
        let prefix: String = if self.location.data_dir.is_empty() {
            String::new()
        } else {
            format!("{}/", self.location.data_dir)
        };

        let mut objects: Vec<ObjectInfo> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .s3_client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(&prefix);

            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|err| CloudError::ListingFailed {
                bucket: bucket.to_string(),
                message: err.to_string(),
            })?;

            for obj in response.contents() {
                let Some(id) = obj.key().and_then(|k| self.location.object_id_from_key(k)) else {
                    continue;
                };
                let last_modified: i64 = obj
                    .last_modified()
                    .and_then(|dt| dt.to_millis().ok())
                    .unwrap_or(0);

                objects.push(ObjectInfo::new(
                    id,
                    obj.size().map(|s| s as u64).unwrap_or(0),
                    last_modified,
                ));
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token.clone();
            } else {
                break;
            }
        }

        Ok(objects)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects: Vec<ObjectInfo> = Vec::new();
        for name in self.resolver.listing_buckets() {
            objects.extend(self.list_bucket(&name).await?);
        }
        debug!("Listed {} objects", objects.len());
        Ok(objects)
    }

    async fn presigned_url(&self, request: &PresignRequest) -> Result<PresignedUrl, StorageError> {
        let (bucket, key) = self.object_location(&request.object_id);
        let config: PresigningConfig = self.presigning_config()?;

        let presigned: PresignedRequest = match (
            request.operation,
            request.upload_id.as_deref(),
            request.part_number,
        ) {
            (TransferOperation::Read, _, _) => {
                let mut get = self.s3_client.get_object().bucket(&bucket).key(&key);
                if let Some(range) = request.range.and_then(|r| r.header_value()) {
                    get = get.range(range);
                }
                get.presigned(config).await.map_err(|e| CloudError::sdk(e, false))?
            }
            (TransferOperation::Write, Some(upload_id), Some(part_number)) => self
                .s3_client
                .upload_part()
                .bucket(&bucket)
                .key(&key)
                .upload_id(upload_id)
                .part_number(part_number as i32)
                .presigned(config)
                .await
                .map_err(|e| CloudError::sdk(e, false))?,
            (TransferOperation::Write, _, _) => self
                .s3_client
                .put_object()
                .bucket(&bucket)
                .key(&key)
                .presigned(config)
                .await
                .map_err(|e| CloudError::sdk(e, false))?,
        };

        Ok(PresignedUrl::expiring_in(presigned.uri(), self.url_expiry))
    }

    async fn initiate_multipart(&self, object_id: &str) -> Result<String, StorageError> {
        let (bucket, key) = self.object_location(object_id);
        let output = self
            .s3_client
            .create_multipart_upload()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| CloudError::sdk(e, true))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Other {
                message: format!("No upload id returned for {}", object_id),
            })
    }

    async fn complete_multipart(
        &self,
        object_id: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<(), StorageError> {
        let mut completed: Vec<CompletedPart> = Vec::with_capacity(parts.len());
        for part in parts {
            let etag: &str = part.etag().ok_or_else(|| StorageError::Other {
                message: format!("Part {} of {} is not completed", part.part_number(), object_id),
            })?;
            completed.push(
                CompletedPart::builder()
                    .part_number(part.part_number() as i32)
                    .e_tag(etag)
                    .build(),
            );
        }

        let (bucket, key) = self.object_location(object_id);
        self.s3_client
            .complete_multipart_upload()
            .bucket(&bucket)
            .key(&key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| CloudError::sdk(e, true))?;

        Ok(())
    }

    async fn abort_multipart(&self, object_id: &str, upload_id: &str) -> Result<(), StorageError> {
        let (bucket, key) = self.object_location(object_id);
        self.s3_client
            .abort_multipart_upload()
            .bucket(&bucket)
            .key(&key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| CloudError::sdk(e, true))?;
        Ok(())
    }
}
