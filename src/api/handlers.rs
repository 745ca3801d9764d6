//! Route handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

use crate::api::image::{image_response, redirect_found};
use crate::backend::traits::BackendKind;
use crate::error::{AppError, Result};
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /{prompt}` on the configured default backend
pub async fn generate_default(
    State(state): State<Arc<AppState>>,
    Path(prompt): Path<String>,
) -> Result<Response> {
    render(&state, &prompt, state.default_backend).await
}

/// `GET /stablediffusion/{prompt}`
pub async fn generate_stable_diffusion(
    State(state): State<Arc<AppState>>,
    Path(prompt): Path<String>,
) -> Result<Response> {
    render(&state, &prompt, BackendKind::StableDiffusion).await
}

/// `GET /midjourney/{prompt}`
pub async fn generate_midjourney(
    State(state): State<Arc<AppState>>,
    Path(prompt): Path<String>,
) -> Result<Response> {
    render(&state, &prompt, BackendKind::Midjourney).await
}

/// `GET /unsplash/{search}`: redirect to the first matching photo
pub async fn search_unsplash(
    State(state): State<Arc<AppState>>,
    Path(search): Path<String>,
) -> Response {
    match state.orchestrator.locate(&search, BackendKind::Unsplash).await {
        Ok(image) => {
            info!(search = %search, url = %image, "Redirecting to search result");
            redirect_found(image.url())
        }
        Err(e @ (AppError::Upstream(_) | AppError::Timeout(_))) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn render(state: &AppState, prompt: &str, kind: BackendKind) -> Result<Response> {
    info!(prompt = %prompt, backend = %kind, "Image requested");
    let bytes = state.orchestrator.render(prompt, kind).await?;
    Ok(image_response(bytes))
}
