//! Metadata server client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use score_storage::{Entity, EntitySource, StorageError};

use crate::error::CloudError;

/// Default number of entities requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 2000;

/// One page of `GET /entities`.
#[derive(Debug, Deserialize)]
struct EntityPage {
    #[serde(default)]
    content: Vec<Entity>,
    #[serde(default)]
    last: bool,
}

/// Pages through the metadata server's entity listing.
#[derive(Debug, Clone)]
pub struct HttpEntitySource {
    client: Client,
    base_url: Url,
    page_size: u32,
    access_token: Option<String>,
}

impl HttpEntitySource {
    /// Create a client for the server at `base_url` (e.g. `https://meta.icgc.org`).
    pub fn new(base_url: &str) -> Result<Self, CloudError> {
        let base_url: Url = Url::parse(base_url)
            .map_err(|e| CloudError::ConfigError(format!("metadata url {}: {}", base_url, e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            page_size: DEFAULT_PAGE_SIZE,
            access_token: None,
        })
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Send a bearer token with every request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Use an existing HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// URL of the entities collection, optionally with a trailing segment.
    fn entities_url(&self, segment: Option<&str>) -> Result<Url, CloudError> {
        let mut url: Url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CloudError::ConfigError("metadata url cannot be a base".to_string()))?;
            segments.pop_if_empty().push("entities");
            if let Some(segment) = segment {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    /// URL of one listing page.
    fn page_url(&self, page: u32) -> Result<Url, CloudError> {
        let mut url: Url = self.entities_url(None)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &self.page_size.to_string());
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Option<reqwest::Response>, CloudError> {
        let mut request = self.client.get(url);
        if let Some(ref token) = self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(CloudError::http)?;

        match response.status() {
            StatusCode::OK => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(CloudError::Status {
                status: status.as_u16(),
                object_id: "entities".to_string(),
            }),
        }
    }

    /// Look up the entity describing one object.
    pub async fn find_entity(&self, object_id: &str) -> Result<Option<Entity>, StorageError> {
        let url: Url = self.entities_url(Some(object_id))?;
        let Some(response) = self.get(url).await? else {
            return Ok(None);
        };
        let entity: Entity = response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.without_url().to_string()))?;
        Ok(Some(entity))
    }

    /// All entities of one bundle.
    pub async fn find_entities_by_gnos_id(&self, gnos_id: &str) -> Result<Vec<Entity>, StorageError> {
        let mut url: Url = self.entities_url(None)?;
        url.query_pairs_mut().append_pair("gnosId", gnos_id);
        let Some(response) = self.get(url).await? else {
            return Ok(Vec::new());
        };
        let page: EntityPage = response
            .json()
            .await
            .map_err(|e| CloudError::InvalidResponse(e.without_url().to_string()))?;
        Ok(page.content)
    }
}

#[async_trait]
impl EntitySource for HttpEntitySource {
    async fn entities(&self) -> Result<Vec<Entity>, StorageError> {
        let mut entities: Vec<Entity> = Vec::new();
        let mut page: u32 = 0;

        loop {
            let url: Url = self.page_url(page)?;
            let Some(response) = self.get(url.clone()).await? else {
                // A missing first page means the listing itself is missing.
                if page == 0 {
                    return Err(StorageError::BackendUnavailable {
                        message: format!("No entity listing at {}", url),
                    });
                }
                break;
            };
            let body: EntityPage = response
                .json()
                .await
                .map_err(|e| CloudError::InvalidResponse(e.without_url().to_string()))?;

            debug!("Entity page {}: {} entities", page, body.content.len());
            if body.content.is_empty() {
                break;
            }
            entities.extend(body.content);
            if body.last {
                break;
            }
            page += 1;
        }

        Ok(entities)
    }
}
