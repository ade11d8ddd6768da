//! REST wrapper around the upload job.

pub mod upload;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use log::info;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::agent::{agent_from_config, SemanticAgent};
use crate::browser::{ChromeLauncher, ContextLauncher};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub launcher: Arc<dyn ContextLauncher>,
    pub agent: Arc<dyn SemanticAgent>,
    /// Jobs share one session file, so they run one at a time.
    pub jobs: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        launcher: Arc<dyn ContextLauncher>,
        agent: Arc<dyn SemanticAgent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            launcher,
            agent,
            jobs: Arc::new(Semaphore::new(1)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/v1/upload_video", post(upload::upload_video))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;
    let launcher: Arc<dyn ContextLauncher> = Arc::new(ChromeLauncher::new(&config));
    let agent: Arc<dyn SemanticAgent> = Arc::from(agent_from_config(&config.agent)?);
    let bind_addr = config.bind_addr();
    let app = router(AppState::new(config, launcher, agent));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    let platform = crate::platforms::douyin::info();
    info!("Listening at {} ({} -> {})", bind_addr, platform.name, platform.upload_url);
    info!("  POST /api/v1/upload_video");
    info!("  GET  /health");
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
