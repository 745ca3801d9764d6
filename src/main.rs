//! Main entry point for the Prompt Image Gateway

use prompt_image_gateway::{api, config::Settings, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting Prompt Image Gateway");
    if let Ok(path) = dotenv {
        info!(path = ?path, "Loaded environment file");
    }
    info!(
        "Loaded configuration: server={}:{} cache_dir={}",
        settings.server.host,
        settings.server.port,
        settings.storage.effective_dir().display()
    );

    // Create application state
    let app_state = Arc::new(AppState::from_settings(settings).await?);
    let addr = format!(
        "{}:{}",
        app_state.settings.server.host, app_state.settings.server.port
    );
    if app_state.backend_registry.is_empty() {
        warn!("No backends configured; every uncached prompt will fail");
    } else if app_state
        .backend_registry
        .get(app_state.default_backend)
        .is_err()
    {
        warn!(backend = %app_state.default_backend, "Default backend is not configured");
    }

    // Build the router
    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
