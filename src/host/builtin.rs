//! Modules every gateway build ships with.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::services::ServeDir;

use super::registry::{GatewayModule, ModuleContext};
use crate::logging::Logger;

pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_STATIC_MOUNT: &str = "/static";

#[derive(Deserialize, Debug)]
#[serde(default)]
struct HealthOptions {
    path: String,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

/// Readiness endpoint. Answers 503 until module initialization has run.
pub struct HealthModule {
    path: String,
    ready_since: Arc<OnceLock<Instant>>,
}

impl HealthModule {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ready_since: Arc::new(OnceLock::new()),
        }
    }
}

async fn health(State(ready_since): State<Arc<OnceLock<Instant>>>) -> Response {
    match ready_since.get() {
        Some(since) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "uptimeSecs": since.elapsed().as_secs() })),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
            .into_response(),
    }
}

#[async_trait]
impl GatewayModule for HealthModule {
    fn routes(&self) -> Router {
        Router::new()
            .route(&self.path, get(health))
            .with_state(self.ready_since.clone())
    }

    async fn start_module(&self) -> anyhow::Result<()> {
        let _ = self.ready_since.set(Instant::now());
        Ok(())
    }
}

pub fn health_module(ctx: &ModuleContext<'_>) -> anyhow::Result<Arc<dyn GatewayModule>> {
    let options: HealthOptions = ctx.options()?;
    anyhow::ensure!(
        options.path.starts_with('/'),
        "health path '{}' must start with '/'",
        options.path
    );
    Ok(Arc::new(HealthModule::new(&options.path)))
}

#[derive(Deserialize, Debug)]
struct StaticOptions {
    root: PathBuf,
    #[serde(default = "default_mount")]
    mount: String,
}

fn default_mount() -> String {
    DEFAULT_STATIC_MOUNT.to_string()
}

/// Serves a directory tree under a mount path.
pub struct StaticModule {
    root: PathBuf,
    mount: String,
    logger: Logger,
}

#[async_trait]
impl GatewayModule for StaticModule {
    fn routes(&self) -> Router {
        Router::new().nest_service(&self.mount, ServeDir::new(&self.root))
    }

    async fn start_module(&self) -> anyhow::Result<()> {
        self.logger.log(
            &["static", "info"],
            &format!("Serving {} at {}", self.root.display(), self.mount),
        );
        Ok(())
    }
}

pub fn static_module(ctx: &ModuleContext<'_>) -> anyhow::Result<Arc<dyn GatewayModule>> {
    let options: StaticOptions = ctx.options()?;
    // axum은 루트("/")에 nest 할 수 없음
    anyhow::ensure!(
        options.mount.starts_with('/') && options.mount.len() > 1,
        "static mount '{}' must be a non-root path starting with '/'",
        options.mount
    );

    let root = ctx.resolve(&options.root);
    anyhow::ensure!(root.is_dir(), "root '{}' is not a directory", root.display());

    Ok(Arc::new(StaticModule {
        root,
        mount: options.mount,
        logger: ctx.logger.clone(),
    }))
}
