//! Prompt Image Gateway
//!
//! Serves images for prompts encoded in URL paths. Generated images are
//! cached on disk by normalized prompt, concurrent requests for the same
//! prompt share one upstream generation, and capacity-constrained backends
//! are guarded by a FIFO concurrency limiter.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod queue;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::{traits::BackendKind, BackendRegistry};
use cache::CacheStore;
use gateway::Orchestrator;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub backend_registry: Arc<BackendRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub default_backend: BackendKind,
}

impl AppState {
    /// Wire state from already constructed parts
    pub fn new(
        settings: config::Settings,
        backend_registry: Arc<BackendRegistry>,
        store: Arc<CacheStore>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::from_settings(
            &settings,
            store,
            backend_registry.clone(),
        ));
        Self {
            default_backend: settings.routing.default_backend,
            settings: Arc::new(settings),
            backend_registry,
            orchestrator,
        }
    }

    /// Open the cache and register every configured backend
    pub async fn from_settings(settings: config::Settings) -> Result<Self> {
        let store = Arc::new(CacheStore::open(settings.storage.effective_dir()).await?);

        let backend_registry = Arc::new(BackendRegistry::new());
        backend_registry.initialize_from_config(&settings.backends)?;

        Ok(Self::new(settings, backend_registry, store))
    }
}
