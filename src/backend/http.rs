//! HTTP plumbing shared by the backend clients

use bytes::Bytes;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, Result};

/// Build the HTTP client a backend uses for every call
pub fn build_client(timeout_ms: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-success response into an upstream error carrying its body
pub async fn check_status(backend: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Upstream(format!(
        "{} returned {}: {}",
        backend, status, body
    )))
}

/// Download an image URL into memory
pub async fn download(client: &Client, backend: &str, url: &str) -> Result<Bytes> {
    let response = client.get(url).send().await?;
    let response = check_status(backend, response).await?;
    let bytes = response.bytes().await?;

    debug!(backend = %backend, url = %url, size = bytes.len(), "Downloaded image");
    Ok(bytes)
}
