//! Database connection pool
//!
//! `DbPool` is constructed once at startup and passed to whoever needs it;
//! there is no process-wide instance. Checkout is scoped by ownership:
//! a [`PooledConnection`] goes back to the pool when dropped and a
//! [`DbTransaction`] rolls back when dropped without `commit()`.

use std::time::Duration;

use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::error::{HrError, Result};

/// Exclusive handle to one pooled connection
pub type PooledConnection = PoolConnection<Postgres>;

/// Transaction scope: commit on success, rollback on drop
pub type DbTransaction = Transaction<'static, Postgres>;

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max: u32,
}

#[derive(Clone, Debug)]
pub struct DbPool {
    pool: PgPool,
    max_connections: u32,
}

impl DbPool {
    /// Connect to the configured database.
    ///
    /// Fails with [`HrError::Connect`] if the server cannot be reached. The
    /// caller decides what to do with that; nothing is retried here.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(
            db = %config.display_target(),
            min = config.min_connections,
            max = config.max_connections,
            "connecting database pool"
        );

        let pool = Self::options(config)
            .connect_with(config.connect_options())
            .await
            .map_err(|source| {
                error!(db = %config.display_target(), error = %source, "database pool initialization failed");
                HrError::Connect { source }
            })?;

        info!("database pool ready");
        Ok(Self {
            pool,
            max_connections: config.max_connections,
        })
    }

    /// Build the pool without opening any connection. Connections are made
    /// on first use, so unreachable databases only show up as errors later.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let pool = Self::options(config).connect_lazy_with(config.connect_options());
        Self {
            pool,
            max_connections: config.max_connections,
        }
    }

    /// Wrap an existing sqlx pool (used by `#[sqlx::test]` fixtures)
    pub fn from_pool(pool: PgPool, max_connections: u32) -> Self {
        Self {
            pool,
            max_connections,
        }
    }

    fn options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(Duration::from_secs(600)))
    }

    /// Check out a connection, waiting while all of them are in use.
    ///
    /// The wait is bounded by the configured acquire timeout, after which
    /// `HrError::Database(PoolTimedOut)` is returned.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a transaction on a pooled connection.
    ///
    /// Call `commit()` on the returned guard when the work succeeded; any
    /// early return or `?` drops it, which rolls back and releases the
    /// connection.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Borrow the underlying sqlx pool for one-shot queries
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.max_connections,
        }
    }

    /// Close every connection. Outstanding checkouts finish first.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("all database connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazy_pool_reports_configured_max() {
        let mut config = DatabaseConfig::default();
        config.max_connections = 3;
        config.min_connections = 0;

        let pool = DbPool::connect_lazy(&config);
        let stats = pool.stats();
        assert_eq!(stats.max, 3);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn unreachable_database_is_fatal_connect_error() {
        let mut config = DatabaseConfig::default();
        config.host = "127.0.0.1".into();
        // Reserved port; nothing listens there
        config.port = 1;
        config.min_connections = 0;
        config.acquire_timeout_secs = 2;

        let err = DbPool::connect(&config).await.unwrap_err();
        assert!(err.is_fatal(), "expected connect error, got {err:?}");
    }
}
