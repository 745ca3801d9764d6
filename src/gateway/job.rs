//! Generation job state machine with a bounded polling budget

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::traits::{ImageBackend, ImageRef, PollStatus, SubmissionRef};
use crate::cache::CacheKey;
use crate::config::PollConfig;
use crate::error::{AppError, Result};

/// How long and how often a job is polled
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Pause before each status check
    pub interval: Duration,
    /// Status checks allowed before giving up
    pub max_attempts: u32,
    /// Wall-clock budget for the whole polling phase
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Where a job stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Polling { attempts: u32 },
    Succeeded(ImageRef),
    Failed(String),
}

/// A submitted prompt being driven to a terminal state
#[derive(Debug)]
pub struct GenerationJob {
    key: CacheKey,
    submission: SubmissionRef,
    status: JobStatus,
    started_at: Instant,
}

impl GenerationJob {
    pub fn new(key: CacheKey, submission: SubmissionRef) -> Self {
        Self {
            key,
            submission,
            status: JobStatus::Submitted,
            started_at: Instant::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }

    /// Perform one transition: wait one interval, check the status once
    pub async fn step(&mut self, backend: &dyn ImageBackend, policy: &PollPolicy) -> Result<()> {
        let attempts = match self.status {
            JobStatus::Submitted => 0,
            JobStatus::Polling { attempts } => attempts,
            JobStatus::Succeeded(_) | JobStatus::Failed(_) => return Ok(()),
        };

        if attempts >= policy.max_attempts {
            return Err(AppError::Timeout(format!(
                "job {} for '{}' still pending after {} polls",
                self.submission.id(),
                self.key,
                attempts
            )));
        }

        if matches!(self.submission, SubmissionRef::Job(_)) {
            tokio::time::sleep(policy.interval).await;
        }

        self.status = match backend.poll(&self.submission).await? {
            PollStatus::Pending => JobStatus::Polling {
                attempts: attempts + 1,
            },
            PollStatus::Ready(image) => JobStatus::Succeeded(image),
            PollStatus::Failed(reason) => JobStatus::Failed(reason),
        };

        debug!(
            key = %self.key,
            backend = %self.key.backend(),
            job_id = %self.submission.id(),
            attempt = attempts + 1,
            status = ?self.status,
            "Polled job"
        );
        Ok(())
    }

    /// Step until terminal or until the policy runs out
    pub async fn run_to_completion(
        &mut self,
        backend: &dyn ImageBackend,
        policy: &PollPolicy,
    ) -> Result<ImageRef> {
        let polling = async {
            while !self.is_terminal() {
                self.step(backend, policy).await?;
            }
            Ok::<(), AppError>(())
        };

        let timed = tokio::time::timeout(policy.timeout, polling).await;
        let outcome = match timed {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "job {} for '{}' did not finish within {:?}",
                self.submission.id(),
                self.key,
                policy.timeout
            ))),
        };

        let result = match (outcome, &self.status) {
            (Err(e), _) => Err(e),
            (Ok(()), JobStatus::Succeeded(image)) => Ok(image.clone()),
            (Ok(()), JobStatus::Failed(reason)) => Err(AppError::Upstream(reason.clone())),
            (Ok(()), _) => Err(AppError::Internal("job stopped before a terminal state".to_string())),
        };

        if let Err(e) = &result {
            warn!(
                key = %self.key,
                backend = %self.key.backend(),
                job_id = %self.submission.id(),
                elapsed_ms = self.started_at.elapsed().as_millis() as u64,
                error = %e,
                "Job did not succeed"
            );
            if !self.is_terminal() {
                self.status = JobStatus::Failed(e.to_string());
            }
            backend.abandon(&self.submission);
        }
        result
    }
}
