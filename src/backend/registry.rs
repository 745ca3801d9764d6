//! Registry of configured backends and their concurrency limiters

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::backend::midjourney::MidjourneyBackend;
use crate::backend::replicate::ReplicateBackend;
use crate::backend::traits::{BackendKind, ImageBackend};
use crate::backend::unsplash::UnsplashBackend;
use crate::config::BackendsConfig;
use crate::error::{AppError, Result};
use crate::queue::ConcurrencyLimiter;

/// A backend together with the limiter guarding it, if it has a capacity
#[derive(Clone)]
pub struct BackendHandle {
    pub backend: Arc<dyn ImageBackend>,
    pub limiter: Option<Arc<ConcurrencyLimiter>>,
}

/// Backends available to the orchestrator, keyed by kind
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<BackendKind, BackendHandle>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, creating a limiter when it declares a capacity
    pub fn register(&self, backend: Arc<dyn ImageBackend>) {
        let kind = backend.kind();
        let limiter = backend
            .max_concurrent()
            .map(|n| Arc::new(ConcurrencyLimiter::new(kind.as_str(), n)));

        info!(
            backend = %backend.name(),
            kind = %kind,
            max_concurrent = ?backend.max_concurrent(),
            "Registered backend"
        );
        self.backends
            .write()
            .insert(kind, BackendHandle { backend, limiter });
    }

    /// Build and register every enabled backend section
    pub fn initialize_from_config(&self, config: &BackendsConfig) -> Result<()> {
        if let Some(sd) = config.stablediffusion.as_ref().filter(|c| c.enabled) {
            self.register(Arc::new(ReplicateBackend::new(sd)?));
        }
        if let Some(mj) = config.midjourney.as_ref().filter(|c| c.enabled) {
            self.register(Arc::new(MidjourneyBackend::new(mj)?));
        }
        if let Some(us) = config.unsplash.as_ref().filter(|c| c.enabled) {
            self.register(Arc::new(UnsplashBackend::new(us)?));
        }
        Ok(())
    }

    pub fn get(&self, kind: BackendKind) -> Result<BackendHandle> {
        self.backends
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::BackendNotFound(kind.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }
}
