//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use hrdash_core::db::PoolStats;
use hrdash_core::BootstrapStatus;
use serde::Serialize;

use crate::http::server::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when table bootstrap failed at startup
    pub status: &'static str,
    pub version: &'static str,
    pub database: BootstrapStatus,
    pub pool: PoolStats,
    pub assistant_enabled: bool,
}

/// GET /health
///
/// Answers without touching the database, so it stays cheap for probes.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.bootstrap.is_ready() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: state.bootstrap.clone(),
        pool: state.pool.stats(),
        assistant_enabled: state.generator.is_some(),
    })
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
