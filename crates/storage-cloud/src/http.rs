//! Transfers against presigned URLs over plain HTTP(S).

use async_trait::async_trait;
use reqwest::header::{ETAG, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use score_storage::{
    ByteRange, ClientSettings, PartTransport, PresignedUrl, RangeFetcher, StorageError,
};

use crate::error::CloudError;

/// RangeFetcher and PartTransport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport honoring the client timeouts.
    pub fn new(settings: &ClientSettings) -> Result<Self, CloudError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = settings.read_timeout() {
            builder = builder.timeout(timeout);
        }
        let client: Client = builder
            .build()
            .map_err(|e| CloudError::ConfigError(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Object id of a presigned URL, for error messages without the signature.
fn object_hint(url: &PresignedUrl) -> String {
    url::Url::parse(&url.url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(str::to_string)))
        .unwrap_or_default()
}

#[async_trait]
impl RangeFetcher for HttpTransport {
    async fn fetch(&self, url: &PresignedUrl, range: ByteRange) -> Result<Vec<u8>, StorageError> {
        let Some(header) = range.header_value() else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(&url.url)
            .header(RANGE, header)
            .send()
            .await
            .map_err(CloudError::http)?;

        let status: StatusCode = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(CloudError::Status {
                status: status.as_u16(),
                object_id: object_hint(url),
            }
            .into());
        }

        let body = response.bytes().await.map_err(CloudError::http)?;

        // A server ignoring the Range header returns the whole object.
        if status == StatusCode::OK && body.len() as u64 > range.len() {
            debug!("Server ignored range request, slicing full body");
            let clipped: ByteRange = range.clip(body.len() as u64);
            return Ok(body[clipped.start as usize..clipped.end as usize].to_vec());
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl PartTransport for HttpTransport {
    async fn put_part(&self, url: &PresignedUrl, data: &[u8]) -> Result<String, StorageError> {
        let response = self
            .client
            .put(&url.url)
            .body(data.to_vec())
            .send()
            .await
            .map_err(CloudError::http)?;

        let status: StatusCode = response.status();
        if !status.is_success() {
            return Err(CloudError::Status {
                status: status.as_u16(),
                object_id: object_hint(url),
            }
            .into());
        }

        let etag: String = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CloudError::InvalidResponse("missing ETag header".to_string()))?;
        Ok(etag)
    }
}
