//! Activity log listing

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use hrdash_core::{ActivityEntry, ActivityLog};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /activity?limit=
async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let entries = ActivityLog::new(&state.pool).recent(params.limit).await?;
    Ok(Json(entries))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/activity", get(recent))
}
