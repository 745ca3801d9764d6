//! Midjourney backend driven through a task proxy session
//!
//! The bot only produces a 2x2 grid for an `imagine` command; the final image
//! comes from a second `upscale` action on the finished grid. The session
//! assigns a task id to every command and replies are correlated through it.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::http::{build_client, check_status, download};
use crate::backend::traits::{BackendKind, ImageBackend, ImageRef, PollStatus, SubmissionRef};
use crate::config::MidjourneyConfig;
use crate::error::{AppError, Result};

/// Snapshot of a session task
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTask {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub buttons: Vec<TaskButton>,
}

/// An action offered on a finished task (`U1`..`U4`, `V1`.., reroll)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskButton {
    pub custom_id: String,
    #[serde(default)]
    pub label: String,
}

/// The long-lived session the bot is reached through
#[async_trait]
pub trait MidjourneySession: Send + Sync {
    /// Send an `imagine` command, returning the session task id
    async fn imagine(&self, prompt: &str) -> Result<String>;

    /// Trigger a button on a finished task, returning the new task id
    async fn action(&self, task_id: &str, custom_id: &str) -> Result<String>;

    /// Current state of a task
    async fn task(&self, task_id: &str) -> Result<SessionTask>;

    /// Client used to download the produced assets
    fn http_client(&self) -> &Client;
}

#[derive(Debug, Serialize)]
struct ImagineRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionRequest<'a> {
    task_id: &'a str,
    custom_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    code: i32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    result: Option<String>,
}

/// Accepted reply codes: submitted, already exists, queued
const ACCEPTED_CODES: [i32; 3] = [1, 21, 22];

/// Session over the HTTP task proxy
pub struct ProxySession {
    client: Client,
    base_url: String,
    api_secret: String,
}

impl ProxySession {
    pub fn new(config: &MidjourneyConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_secret: config.api_secret.clone(),
        })
    }

    async fn submit<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("mj-api-secret", &self.api_secret)
            .json(body)
            .send()
            .await?;
        let reply: SubmitReply = check_status("midjourney", response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse session reply: {}", e)))?;

        match reply.result {
            Some(task_id) if ACCEPTED_CODES.contains(&reply.code) => Ok(task_id),
            _ => Err(AppError::Upstream(format!(
                "session rejected command (code {}): {}",
                reply.code, reply.description
            ))),
        }
    }
}

#[async_trait]
impl MidjourneySession for ProxySession {
    async fn imagine(&self, prompt: &str) -> Result<String> {
        self.submit("/mj/submit/imagine", &ImagineRequest { prompt })
            .await
    }

    async fn action(&self, task_id: &str, custom_id: &str) -> Result<String> {
        self.submit("/mj/submit/action", &ActionRequest { task_id, custom_id })
            .await
    }

    async fn task(&self, task_id: &str) -> Result<SessionTask> {
        let response = self
            .client
            .get(format!("{}/mj/task/{}/fetch", self.base_url, task_id))
            .header("mj-api-secret", &self.api_secret)
            .send()
            .await?;
        check_status("midjourney", response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse task: {}", e)))
    }

    fn http_client(&self) -> &Client {
        &self.client
    }
}

/// Capacity-constrained interactive backend
pub struct MidjourneyBackend {
    session: Arc<dyn MidjourneySession>,
    max_concurrent: usize,
    upscale_label: String,
    /// imagine task id -> upscale task id
    upscales: DashMap<String, String>,
}

impl MidjourneyBackend {
    pub fn new(config: &MidjourneyConfig) -> Result<Self> {
        let session = Arc::new(ProxySession::new(config)?);
        Ok(Self::with_session(session, config.max_concurrent, config.upscale_index))
    }

    pub fn with_session(
        session: Arc<dyn MidjourneySession>,
        max_concurrent: usize,
        upscale_index: u8,
    ) -> Self {
        Self {
            session,
            max_concurrent,
            upscale_label: format!("U{}", upscale_index),
            upscales: DashMap::new(),
        }
    }

    async fn poll_upscale(&self, grid_id: &str, upscale_id: &str) -> Result<PollStatus> {
        let task = self.session.task(upscale_id).await?;
        let status = match task.status.as_str() {
            "SUCCESS" => match task.image_url {
                Some(url) => PollStatus::Ready(ImageRef(url)),
                None => PollStatus::Failed(format!("upscale {} finished without image", upscale_id)),
            },
            "FAILURE" | "CANCEL" => PollStatus::Failed(
                task.fail_reason
                    .unwrap_or_else(|| format!("upscale {} failed", upscale_id)),
            ),
            _ => PollStatus::Pending,
        };

        if status != PollStatus::Pending {
            self.upscales.remove(grid_id);
        }
        Ok(status)
    }

    async fn poll_grid(&self, grid_id: &str) -> Result<PollStatus> {
        let task = self.session.task(grid_id).await?;
        match task.status.as_str() {
            "SUCCESS" => {
                let button = task
                    .buttons
                    .iter()
                    .find(|b| b.label == self.upscale_label);
                let Some(button) = button else {
                    return Ok(PollStatus::Failed(format!(
                        "task {} offers no {} action",
                        grid_id, self.upscale_label
                    )));
                };

                let upscale_id = self.session.action(grid_id, &button.custom_id).await?;
                info!(grid = %grid_id, upscale = %upscale_id, "Requested upscale");
                self.upscales.insert(grid_id.to_string(), upscale_id);
                Ok(PollStatus::Pending)
            }
            "FAILURE" | "CANCEL" => Ok(PollStatus::Failed(
                task.fail_reason
                    .unwrap_or_else(|| format!("imagine {} failed", grid_id)),
            )),
            _ => Ok(PollStatus::Pending),
        }
    }

    /// Number of grids currently waiting on their upscale
    pub fn pending_upscales(&self) -> usize {
        self.upscales.len()
    }
}

#[async_trait]
impl ImageBackend for MidjourneyBackend {
    fn name(&self) -> &str {
        "midjourney"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Midjourney
    }

    fn max_concurrent(&self) -> Option<usize> {
        Some(self.max_concurrent)
    }

    async fn submit(&self, prompt: &str) -> Result<SubmissionRef> {
        let task_id = self.session.imagine(prompt).await?;
        debug!(backend = %self.name(), job_id = %task_id, "Imagine submitted");
        Ok(SubmissionRef::Job(task_id))
    }

    async fn poll(&self, submission: &SubmissionRef) -> Result<PollStatus> {
        let grid_id = match submission {
            SubmissionRef::Job(id) => id,
            SubmissionRef::Ready(image) => return Ok(PollStatus::Ready(image.clone())),
        };

        let upscale_id = self.upscales.get(grid_id.as_str()).map(|e| e.value().clone());
        match upscale_id {
            Some(upscale_id) => self.poll_upscale(grid_id, &upscale_id).await,
            None => self.poll_grid(grid_id).await,
        }
    }

    fn abandon(&self, submission: &SubmissionRef) {
        if let SubmissionRef::Job(id) = submission {
            self.upscales.remove(id.as_str());
        }
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Bytes> {
        download(self.session.http_client(), self.name(), image.url()).await
    }
}
