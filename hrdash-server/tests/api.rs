//! Router-level tests. The pool points at a closed port, so every case here
//! either never reaches the database or checks how its absence is reported.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hrdash_core::config::DatabaseConfig;
use hrdash_core::{BootstrapStatus, DbPool, HrConfig, Result, SqlGenerator};
use hrdash_server::{build_router, AppState, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Canned(&'static str);

#[async_trait]
impl SqlGenerator for Canned {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn unreachable_pool() -> DbPool {
    let mut db = DatabaseConfig::default();
    db.port = 1;
    db.min_connections = 0;
    db.acquire_timeout_secs = 1;
    DbPool::connect_lazy(&db)
}

fn state() -> AppState {
    AppState::new(unreachable_pool(), HrConfig::default(), BootstrapStatus::Ready)
}

fn app_with(state: AppState) -> Router {
    build_router(state, &ServerConfig::default())
}

fn app() -> Router {
    app_with(state())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_bytes(uri: &str, body: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_is_ok_without_database() {
    let (status, body) = send(app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"]["status"], "ready");
    assert_eq!(body["pool"]["max"], 10);
    assert_eq!(body["assistant_enabled"], false);
}

#[tokio::test]
async fn health_reports_degraded_bootstrap() {
    let state = AppState::new(
        unreachable_pool(),
        HrConfig::default(),
        BootstrapStatus::Degraded {
            reason: "permission denied".into(),
        },
    );
    let (status, body) = send(app_with(state), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"]["reason"], "permission denied");
}

#[tokio::test]
async fn lists_report_catalogue() {
    let (status, body) = send(app(), get("/reports")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert!(names.contains(&"headcount_by_department"));
    assert!(names.contains(&"new_joiners"));
    // SQL text stays server-side
    assert!(body[0].get("sql").is_none());
}

#[tokio::test]
async fn unknown_report_is_404() {
    let (status, body) = send(app(), get("/reports/payroll_forecast")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_report");
}

#[tokio::test]
async fn missing_report_parameter_is_400() {
    let (status, body) = send(app(), get("/reports/new_joiners")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_parameter");
    assert!(body["message"].as_str().unwrap().contains("from"));
}

#[tokio::test]
async fn bad_report_parameter_is_400() {
    let (status, body) = send(app(), get("/reports/new_joiners?from=last-tuesday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_parameter");
}

#[tokio::test]
async fn destructive_query_is_403() {
    for sql in [
        "DROP TABLE employees",
        "DELETE FROM employees",
        "SELECT 1; UPDATE employees SET salary = 0",
    ] {
        let (status, body) = send(app(), post_json("/query", json!({ "sql": sql }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{sql}");
        assert_eq!(body["error"], "query_rejected");
    }
}

#[tokio::test]
async fn upload_rejects_unsafe_table_name() {
    let (status, body) = send(app(), post_bytes("/uploads/1table", b"a,b\n1,2\n")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_identifier");
}

#[tokio::test]
async fn upload_rejects_unknown_format() {
    let (status, body) = send(
        app(),
        post_bytes("/uploads/employees?format=pdf", b"%PDF-1.7"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_format");
}

#[tokio::test]
async fn upload_rejects_bad_mode() {
    let (status, body) = send(
        app(),
        post_bytes("/uploads/employees?mode=merge", b"a,b\n1,2\n"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_parameter");
}

#[tokio::test]
async fn empty_upload_is_malformed() {
    let (status, body) = send(app(), post_bytes("/uploads/employees", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "malformed_file");
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let config = ServerConfig {
        max_body_bytes: 8,
        ..ServerConfig::default()
    };
    let app = build_router(state(), &config);
    let (status, _) = send(app, post_bytes("/uploads/employees", b"name,amount\nAsha,100\n")).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn ask_without_api_key_is_502() {
    let (status, body) = send(
        app(),
        post_json("/ask", json!({ "question": "total amount by name" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "assistant_error");
}

#[tokio::test]
async fn ask_with_empty_question_is_400() {
    let state = state().with_generator(Arc::new(Canned("SELECT 1")));
    let (status, body) = send(app_with(state), post_json("/ask", json!({ "question": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_parameter");
}

#[tokio::test]
async fn unreachable_database_is_503() {
    let (status, body) = send(app(), get("/tables")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "database_unavailable");
}
