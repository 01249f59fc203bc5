//! Ad-hoc read-only SQL

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::post, Json, Router};
use hrdash_core::{run_read_only, Action, Outcome, QueryOutcome, SqlGuard};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

/// POST /query
///
/// The guard runs before a connection is checked out, so rejected SQL
/// never reaches the database.
async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let max_rows = state.config.assistant.max_rows;
    let result = run_read_only(&state.pool, &request.sql, &SqlGuard::new(), max_rows).await;

    let detail = match &result {
        Ok(outcome) if outcome.truncated => format!("{} rows (truncated)", outcome.table.len()),
        Ok(outcome) => format!("{} rows", outcome.table.len()),
        Err(e) => e.to_string(),
    };
    state.audit(Action::Query, request.sql, detail, Outcome::of(&result));

    Ok(Json(result?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query))
}
