//! hrdash-server: JSON HTTP API over hrdash-core
//!
//! Thin axum handlers. All validation, SQL and file handling lives in the
//! core crate; this crate maps it onto routes and status codes.

pub mod http;

pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
