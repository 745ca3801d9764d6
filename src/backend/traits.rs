//! Common traits and types for image backends

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

/// The backends the gateway knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Diffusion model behind an asynchronous prediction API
    StableDiffusion,
    /// Chat-bot driven generation through a long-lived session
    Midjourney,
    /// Stock photo search
    Unsplash,
}

impl BackendKind {
    /// Path segment / config section name of the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StableDiffusion => "stablediffusion",
            Self::Midjourney => "midjourney",
            Self::Unsplash => "unsplash",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stablediffusion" => Ok(Self::StableDiffusion),
            "midjourney" => Ok(Self::Midjourney),
            "unsplash" => Ok(Self::Unsplash),
            other => Err(AppError::BackendNotFound(other.to_string())),
        }
    }
}

/// Remote location of a finished image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a backend hands back after accepting a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRef {
    /// An upstream job that must be polled, identified by the backend-assigned id
    Job(String),
    /// The image is already known
    Ready(ImageRef),
}

impl SubmissionRef {
    /// Identifier used in logs
    pub fn id(&self) -> &str {
        match self {
            Self::Job(id) => id,
            Self::Ready(image) => image.url(),
        }
    }
}

/// Result of one status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Ready(ImageRef),
    Failed(String),
}

/// Trait for image generation and search backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Which variant this backend is
    fn kind(&self) -> BackendKind;

    /// Maximum simultaneous prompts the backend tolerates, `None` if unbounded
    fn max_concurrent(&self) -> Option<usize> {
        None
    }

    /// Hand a prompt to the backend
    async fn submit(&self, prompt: &str) -> Result<SubmissionRef>;

    /// Check on a submission
    async fn poll(&self, submission: &SubmissionRef) -> Result<PollStatus> {
        match submission {
            SubmissionRef::Ready(image) => Ok(PollStatus::Ready(image.clone())),
            SubmissionRef::Job(id) => Err(AppError::Internal(format!(
                "{} cannot poll job {}",
                self.name(),
                id
            ))),
        }
    }

    /// Drop any per-submission state after the job gave up on it
    fn abandon(&self, _submission: &SubmissionRef) {}

    /// Download the finished image
    async fn fetch(&self, image: &ImageRef) -> Result<Bytes>;
}
