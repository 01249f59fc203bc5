//! Predefined report endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use hrdash_core::reports::{catalogue, ReportDef};
use hrdash_core::{run_report, Action, Outcome, Table};

use crate::http::error::ApiError;
use crate::http::server::AppState;

/// GET /reports
async fn list_reports() -> Json<&'static [ReportDef]> {
    Json(catalogue())
}

/// GET /reports/{name}?param=value
///
/// Query-string keys are report parameters; unknown keys are rejected.
async fn run(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Table>, ApiError> {
    let result = run_report(&state.pool, &name, &params).await;

    let detail = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    state.audit(Action::Report, name, detail, Outcome::of(&result));

    Ok(Json(result?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reports", get(list_reports))
        .route("/reports/{name}", get(run))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalogue_is_served() {
        let Json(reports) = list_reports().await;
        assert!(reports.iter().any(|r| r.name == "headcount_by_department"));
    }
}
