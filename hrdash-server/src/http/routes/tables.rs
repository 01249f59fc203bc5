//! Table catalog endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{routing::get, Json, Router};
use hrdash_core::dataset::{Ident, Schema};
use hrdash_core::db::{catalog, TableSummary};
use serde::Serialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct TableDetail {
    pub name: String,
    pub row_count: i64,
    #[serde(flatten)]
    pub schema: Schema,
}

/// GET /tables
async fn list_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TableSummary>>, ApiError> {
    Ok(Json(catalog::table_summaries(&state.pool).await?))
}

/// GET /tables/{name}
async fn get_table(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TableDetail>, ApiError> {
    let table = Ident::new(&name)?;
    let schema = catalog::describe_table(&state.pool, &table)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "table",
            id: table.to_string(),
        })?;
    let row_count = catalog::row_count(&state.pool, &table).await?;

    Ok(Json(TableDetail {
        name: table.to_string(),
        row_count,
        schema,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(list_tables))
        .route("/tables/{name}", get(get_table))
}
