//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Request body cap sized for spreadsheet uploads
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use hrdash_core::{
    Action, ActivityLog, BootstrapStatus, DbPool, GeminiClient, HrConfig, HrError, Outcome,
    QueryAssistant, SqlGenerator,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::routes;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = localhost only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    /// Largest accepted request body, uploads included
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<HrConfig>,
    pub bootstrap: BootstrapStatus,
    /// `None` when no API key is configured; `/ask` then answers 502
    pub generator: Option<Arc<dyn SqlGenerator>>,
}

impl AppState {
    /// Build state for a pool that has already been bootstrapped. The
    /// Gemini client is created here if an API key is configured.
    pub fn new(pool: DbPool, config: HrConfig, bootstrap: BootstrapStatus) -> Self {
        let generator = match GeminiClient::new(&config.assistant) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn SqlGenerator>),
            Err(e) => {
                tracing::warn!(error = %e, "query assistant disabled");
                None
            }
        };

        Self {
            pool,
            config: Arc::new(config),
            bootstrap,
            generator,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn assistant(&self) -> Result<QueryAssistant, HrError> {
        let generator = self.generator.clone().ok_or_else(|| {
            HrError::assistant("GEMINI_API_KEY is not set; the query assistant is disabled")
        })?;
        Ok(QueryAssistant::new(
            self.pool.clone(),
            generator,
            self.config.assistant.max_rows,
        ))
    }

    /// Record an activity entry in the background. The response never
    /// waits on the audit insert.
    pub fn audit(
        &self,
        action: Action,
        subject: impl Into<String>,
        detail: impl Into<String>,
        outcome: Outcome,
    ) {
        let pool = self.pool.clone();
        let subject = subject.into();
        let detail = detail.into();
        tokio::spawn(async move {
            ActivityLog::new(&pool)
                .record(action, &subject, &detail, outcome)
                .await;
        });
    }
}

/// Assemble routes and middleware. Split out from [`run_server`] so tests
/// can drive the router without binding a socket.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://localhost:3030"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
                HeaderValue::from_static("http://127.0.0.1:3030"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(routes::health::router())
        .merge(routes::tables::router())
        .merge(routes::uploads::router())
        .merge(routes::reports::router())
        .merge(routes::query::router())
        .merge(routes::ask::router())
        .merge(routes::activity::router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Run the HTTP server until Ctrl+C or SIGTERM, then close the pool.
pub async fn run_server(state: AppState, config: ServerConfig) -> Result<(), ServerError> {
    let pool = state.pool.clone();
    let app = build_router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdash_core::config::DatabaseConfig;

    fn lazy_pool() -> DbPool {
        let mut db = DatabaseConfig::default();
        db.port = 1;
        db.min_connections = 0;
        db.acquire_timeout_secs = 1;
        DbPool::connect_lazy(&db)
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3030);
        assert!(!config.cors_permissive);
        assert_eq!(config.max_body_bytes, 25 * 1024 * 1024);
    }

    #[tokio::test]
    async fn assistant_disabled_without_key() {
        let state = AppState::new(lazy_pool(), HrConfig::default(), BootstrapStatus::Ready);
        assert!(state.generator.is_none());
        assert!(matches!(
            state.assistant(),
            Err(HrError::Assistant { .. })
        ));
    }

    #[tokio::test]
    async fn assistant_enabled_with_key() {
        let mut config = HrConfig::default();
        config.assistant.api_key = Some("key".into());
        let state = AppState::new(lazy_pool(), config, BootstrapStatus::Ready);
        assert!(state.assistant().is_ok());
    }
}
