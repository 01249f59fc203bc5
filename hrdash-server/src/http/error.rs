//! API error type with IntoResponse
//!
//! Errors are converted to JSON `{ "error": kind, "message": ... }` bodies.
//! Database details are logged, never returned, except for SQL the user
//! wrote (or asked for), whose server message is returned verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hrdash_core::HrError;
use serde_json::json;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Anything raised by hrdash-core
    Core(HrError),

    /// Resource not found (404)
    NotFound { resource: &'static str, id: String },
}

impl ApiError {
    /// Status, error kind and client-facing message
    fn parts(&self) -> (StatusCode, &'static str, String) {
        let err = match self {
            Self::NotFound { resource, id } => {
                return (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("{} '{}' not found", resource, id),
                )
            }
            Self::Core(err) => err,
        };

        let (status, kind) = match err {
            HrError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
            HrError::InvalidIdentifier { .. } => (StatusCode::BAD_REQUEST, "invalid_identifier"),
            HrError::UnsupportedFormat { .. } => (StatusCode::BAD_REQUEST, "unsupported_format"),
            HrError::MalformedFile { .. } => (StatusCode::BAD_REQUEST, "malformed_file"),
            HrError::MalformedRow { .. } => (StatusCode::BAD_REQUEST, "malformed_row"),
            HrError::SchemaMismatch { .. } => (StatusCode::BAD_REQUEST, "schema_mismatch"),
            HrError::UnknownReport { .. } => (StatusCode::NOT_FOUND, "unknown_report"),
            HrError::QueryRejected { .. } => (StatusCode::FORBIDDEN, "query_rejected"),
            HrError::QueryFailed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "query_failed"),
            HrError::Assistant { .. } => (StatusCode::BAD_GATEWAY, "assistant_error"),
            HrError::Connect { .. } => (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable"),
            HrError::Database(e) if is_connectivity(e) => {
                (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable")
            }
            HrError::Database(_) | HrError::Io { .. } | HrError::Config { .. } => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "an internal error occurred".to_string(),
                )
            }
        };

        let message = match (status, err) {
            (StatusCode::SERVICE_UNAVAILABLE, _) => "the database is unavailable".to_string(),
            (_, HrError::QueryFailed { message }) => message.clone(),
            (_, other) => other.to_string(),
        };
        (status, kind, message)
    }
}

fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();

        if let Self::Core(err) = &self {
            if status.is_server_error() {
                // Log the actual error, the client only sees the generic message
                tracing::error!(error = %err, kind, "request failed");
            } else {
                tracing::debug!(error = %err, kind, "request rejected");
            }
        }

        (
            status,
            Json(json!({
                "error": kind,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<HrError> for ApiError {
    fn from(e: HrError) -> Self {
        Self::Core(e)
    }
}
