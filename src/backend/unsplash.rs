//! Unsplash photo search backend

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::backend::http::{build_client, check_status, download};
use crate::backend::traits::{BackendKind, ImageBackend, ImageRef, SubmissionRef};
use crate::config::UnsplashConfig;
use crate::error::{AppError, Result};

/// Synchronous search: the first result is the answer
pub struct UnsplashBackend {
    client: Client,
    base_url: String,
    access_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

impl UnsplashBackend {
    pub fn new(config: &UnsplashConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
        })
    }
}

#[async_trait]
impl ImageBackend for UnsplashBackend {
    fn name(&self) -> &str {
        "unsplash"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Unsplash
    }

    async fn submit(&self, prompt: &str) -> Result<SubmissionRef> {
        let response = self
            .client
            .get(format!("{}/search/photos", self.base_url))
            .query(&[("query", prompt), ("per_page", "1")])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.access_key),
            )
            .send()
            .await?;
        let search: SearchResponse = check_status(self.name(), response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse search results: {}", e)))?;

        let photo = search
            .results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("no photos for '{}'", prompt)))?;

        debug!(backend = %self.name(), url = %photo.urls.regular, "Search matched");
        Ok(SubmissionRef::Ready(ImageRef(photo.urls.regular)))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Bytes> {
        download(&self.client, self.name(), image.url()).await
    }
}
