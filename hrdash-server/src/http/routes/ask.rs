//! Natural-language query assistant

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::post, Json, Router};
use hrdash_core::{Action, AssistantAnswer, Outcome};
use serde::Deserialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// POST /ask
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AssistantAnswer>, ApiError> {
    let result = match state.assistant() {
        Ok(assistant) => assistant.ask(&request.question).await,
        Err(e) => Err(e),
    };

    let detail = match &result {
        Ok(answer) => answer.sql.clone(),
        Err(e) => e.to_string(),
    };
    state.audit(Action::Ask, request.question, detail, Outcome::of(&result));

    Ok(Json(result?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ask", post(ask))
}
