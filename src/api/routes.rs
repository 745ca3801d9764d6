//! Router construction

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stablediffusion/:prompt", get(handlers::generate_stable_diffusion))
        .route("/midjourney/:prompt", get(handlers::generate_midjourney))
        .route("/unsplash/:search", get(handlers::search_unsplash))
        .route("/:prompt", get(handlers::generate_default))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
