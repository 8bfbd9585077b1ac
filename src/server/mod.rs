//! HTTP API in front of the generation pipeline.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::GenerationPipeline;
use crate::retention::{spawn_sweeper, RetentionScheduler};
use crate::tools::MediaTools;

pub mod handlers;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
}

impl AppState {
    pub fn new(pipeline: GenerationPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the API until interrupted
pub async fn serve(config: Config) -> Result<()> {
    let retention = Arc::new(RetentionScheduler::start());
    let pipeline = GenerationPipeline::from_config(&config, retention);

    let layout = pipeline.layout().clone();
    layout
        .ensure()
        .await
        .with_context(|| format!("Failed to create media directories under {}", layout.media_root.display()))?;

    // Picks up artifacts whose in-memory deletion was lost to a restart.
    let sweeper = spawn_sweeper(
        vec![layout.output_dir.clone(), layout.scratch_dir.clone()],
        config.retention_window(),
        config.sweep_interval(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Parody generator listening on http://{}", listener.local_addr()?);
    tracing::info!("Media directory: {}", layout.media_root.display());
    tracing::info!("Tool backend: {}", pipeline.tools().backend_name());

    axum::serve(listener, router(AppState::new(pipeline)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
