//! Request orchestration: cache lookup, single-flight, limiter, generation, cache fill

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::registry::{BackendHandle, BackendRegistry};
use crate::backend::traits::{BackendKind, ImageRef};
use crate::cache::{CacheKey, CacheStore};
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::gateway::inflight::{InFlightRegistry, Role};
use crate::gateway::job::{GenerationJob, PollPolicy};
use crate::queue::Permit;

/// Turns prompts into image bytes, generating each distinct prompt at most once at a time
pub struct Orchestrator {
    store: Arc<CacheStore>,
    registry: Arc<BackendRegistry>,
    inflight: InFlightRegistry,
    poll_policy: PollPolicy,
    follower_wait: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<CacheStore>,
        registry: Arc<BackendRegistry>,
        poll_policy: PollPolicy,
        follower_wait: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            inflight: InFlightRegistry::new(),
            poll_policy,
            follower_wait,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Arc<CacheStore>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self::new(
            store,
            registry,
            PollPolicy::from(&settings.poll),
            settings.orchestrator.follower_wait(),
        )
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    /// Serve `kind`'s image for a raw prompt segment, generating and caching it on a miss
    pub async fn render(&self, raw_prompt: &str, kind: BackendKind) -> Result<Bytes> {
        let key = CacheKey::parse(kind, raw_prompt)?;

        if let Some(bytes) = lookup(&self.store, &key).await? {
            debug!(key = %key, "Cache hit");
            return Ok(bytes);
        }

        let handle = self.registry.get(kind)?;
        let job = GenerationTask {
            key: key.clone(),
            handle,
            store: Arc::clone(&self.store),
            policy: self.poll_policy.clone(),
        };

        let (flight, role) = self.inflight.join_or_start(&key, move || job.run());
        match role {
            Role::Leader => {
                debug!(key = %key, backend = %kind, "Cache miss, generating");
                flight.await
            }
            Role::Follower => {
                debug!(key = %key, "Joining generation already in flight");
                tokio::time::timeout(self.follower_wait, flight)
                    .await
                    .map_err(|_| {
                        AppError::Timeout(format!(
                            "gave up waiting {:?} for '{}'",
                            self.follower_wait, key
                        ))
                    })?
            }
        }
    }

    /// Resolve a prompt to a remote image without downloading or caching it
    pub async fn locate(&self, raw_prompt: &str, kind: BackendKind) -> Result<ImageRef> {
        let key = CacheKey::parse(kind, raw_prompt)?;
        let handle = self.registry.get(kind)?;
        let _permit = acquire(&handle).await?;

        let backend = handle.backend.as_ref();
        let submission = backend.submit(key.prompt()).await?;
        let mut job = GenerationJob::new(key, submission);
        job.run_to_completion(backend, &self.poll_policy).await
    }
}

/// Cache read that treats a vanished entry as a miss
async fn lookup(store: &CacheStore, key: &CacheKey) -> Result<Option<Bytes>> {
    if !store.exists(key).await? {
        return Ok(None);
    }
    match store.read(key).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn acquire(handle: &BackendHandle) -> Result<Option<Permit>> {
    match &handle.limiter {
        Some(limiter) => {
            debug!(
                limiter = %limiter.name(),
                available = limiter.available(),
                waiting = limiter.waiting(),
                "Waiting for backend slot"
            );
            limiter.acquire().await.map(Some)
        }
        None => Ok(None),
    }
}

/// Everything the leader needs, owned so it can outlive the request
struct GenerationTask {
    key: CacheKey,
    handle: BackendHandle,
    store: Arc<CacheStore>,
    policy: PollPolicy,
}

impl GenerationTask {
    async fn run(self) -> Result<Bytes> {
        let result = self.generate().await;
        if let Err(e) = &result {
            warn!(
                key = %self.key,
                backend = %self.handle.backend.name(),
                error = %e,
                "Generation failed"
            );
        }
        result
    }

    async fn generate(&self) -> Result<Bytes> {
        // A flight for this key may have completed between the caller's lookup and now.
        if let Some(bytes) = lookup(&self.store, &self.key).await? {
            return Ok(bytes);
        }

        let permit = acquire(&self.handle).await?;
        let backend = self.handle.backend.as_ref();

        let submission = backend.submit(self.key.prompt()).await?;
        info!(
            key = %self.key,
            backend = %backend.name(),
            job_id = %submission.id(),
            "Submitted prompt"
        );

        let mut job = GenerationJob::new(self.key.clone(), submission);
        let image = job.run_to_completion(backend, &self.policy).await?;
        let bytes = backend.fetch(&image).await?;
        self.store.write(&self.key, &bytes).await?;
        drop(permit);

        info!(
            key = %self.key,
            backend = %backend.name(),
            size = bytes.len(),
            "Generated and cached image"
        );
        Ok(bytes)
    }
}
