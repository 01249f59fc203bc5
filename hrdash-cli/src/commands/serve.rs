//! `hrdash serve`: run the JSON HTTP API

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use hrdash_core::db::bootstrap;
use hrdash_server::{run_server, AppState, ServerConfig};

use super::Session;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', default_value = "127.0.0.1:3030")]
    pub bind: SocketAddr,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Largest accepted upload, in megabytes
    #[arg(long, default_value_t = 25)]
    pub max_upload_mb: usize,
}

pub async fn run(session: &Session, args: ServeArgs) -> Result<()> {
    let config = session.config()?;

    // An unreachable database is fatal here; nothing is served without it
    let pool = session.connect(&config).await?;
    let status = bootstrap(&pool).await;
    if !status.is_ready() {
        tracing::warn!(?status, "serving with degraded table bootstrap");
    }

    let server_config = ServerConfig {
        bind_addr: args.bind,
        cors_permissive: args.cors_permissive,
        max_body_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };

    tracing::info!("Starting hrdash server on {}", args.bind);
    run_server(AppState::new(pool, config, status), server_config)
        .await
        .context("Server error")?;

    Ok(())
}
