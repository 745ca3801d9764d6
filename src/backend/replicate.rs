//! Replicate predictions backend (asynchronous jobs)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::http::{build_client, check_status, download};
use crate::backend::traits::{BackendKind, ImageBackend, ImageRef, PollStatus, SubmissionRef};
use crate::config::ReplicateConfig;
use crate::error::{AppError, Result};

/// Stable Diffusion through the Replicate prediction API
pub struct ReplicateBackend {
    client: Client,
    base_url: String,
    api_token: String,
    model_version: String,
    max_concurrent: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Models return either a list of files or a single one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl PredictionOutput {
    fn first(self) -> Option<String> {
        match self {
            Self::Many(urls) => urls.into_iter().next(),
            Self::One(url) => Some(url),
        }
    }
}

impl ReplicateBackend {
    pub fn new(config: &ReplicateConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            model_version: config.model_version.clone(),
            max_concurrent: config.max_concurrent,
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_token)
    }

    fn interpret(prediction: Prediction) -> PollStatus {
        match prediction.status.as_str() {
            "succeeded" => match prediction.output.and_then(PredictionOutput::first) {
                Some(url) => PollStatus::Ready(ImageRef(url)),
                None => PollStatus::Failed(format!(
                    "prediction {} succeeded without output",
                    prediction.id
                )),
            },
            "failed" | "canceled" => {
                let reason = match prediction.error {
                    Some(serde_json::Value::String(msg)) => msg,
                    Some(other) => other.to_string(),
                    None => format!("prediction {}", prediction.status),
                };
                PollStatus::Failed(reason)
            }
            _ => PollStatus::Pending,
        }
    }
}

#[async_trait]
impl ImageBackend for ReplicateBackend {
    fn name(&self) -> &str {
        "replicate"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::StableDiffusion
    }

    fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    async fn submit(&self, prompt: &str) -> Result<SubmissionRef> {
        let request = PredictionRequest {
            version: &self.model_version,
            input: PredictionInput { prompt },
        };

        let response = self
            .client
            .post(format!("{}/v1/predictions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&request)
            .send()
            .await?;
        let prediction: Prediction = check_status(self.name(), response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse prediction: {}", e)))?;

        debug!(backend = %self.name(), job_id = %prediction.id, "Prediction created");
        Ok(SubmissionRef::Job(prediction.id))
    }

    async fn poll(&self, submission: &SubmissionRef) -> Result<PollStatus> {
        let id = match submission {
            SubmissionRef::Job(id) => id,
            SubmissionRef::Ready(image) => return Ok(PollStatus::Ready(image.clone())),
        };

        let response = self
            .client
            .get(format!("{}/v1/predictions/{}", self.base_url, id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        let prediction: Prediction = check_status(self.name(), response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse prediction: {}", e)))?;

        debug!(backend = %self.name(), job_id = %id, status = %prediction.status, "Polled prediction");
        Ok(Self::interpret(prediction))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Bytes> {
        download(&self.client, self.name(), image.url()).await
    }
}
