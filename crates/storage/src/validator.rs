//! Presigned URL validation.

use std::time::{Duration, SystemTime};

use tracing::debug;
use url::Url;

use crate::traits::PresignedUrlValidator;
use crate::types::PresignedUrl;

/// Accepts well-formed http(s) URLs that are not about to expire.
#[derive(Debug, Clone, Default)]
pub struct ExpiryUrlValidator {
    /// URLs expiring within this window are rejected.
    clock_skew: Duration,
}

impl ExpiryUrlValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiry safety window.
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    fn parse(&self, url: &PresignedUrl) -> Option<Url> {
        let parsed: Url = match Url::parse(&url.url) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Rejecting unparsable presigned URL: {}", e);
                return None;
            }
        };

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            debug!("Rejecting presigned URL with scheme {}", parsed.scheme());
            return None;
        }

        if url.is_expired_at(SystemTime::now() + self.clock_skew) {
            debug!("Rejecting expired presigned URL");
            return None;
        }

        Some(parsed)
    }
}

impl PresignedUrlValidator for ExpiryUrlValidator {
    fn validate(&self, url: &PresignedUrl) -> bool {
        self.parse(url).is_some()
    }
}

/// Additionally requires the query parameters of an S3 signature.
#[derive(Debug, Clone, Default)]
pub struct S3QueryValidator {
    base: ExpiryUrlValidator,
}

impl S3QueryValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiry safety window.
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.base = self.base.with_clock_skew(clock_skew);
        self
    }
}

impl PresignedUrlValidator for S3QueryValidator {
    fn validate(&self, url: &PresignedUrl) -> bool {
        let Some(parsed) = self.base.parse(url) else {
            return false;
        };

        let has = |name: &str| parsed.query_pairs().any(|(k, v)| k == name && !v.is_empty());

        let sigv4: bool =
            has("X-Amz-Signature") && (has("X-Amz-Expires") || has("X-Amz-Date"));
        let legacy: bool = has("Signature") && has("Expires");

        if !(sigv4 || legacy) {
            debug!("Rejecting presigned URL without signature parameters");
        }
        sigv4 || legacy
    }
}
