//! Idempotent creation of the HR tables
//!
//! Runs on every start. Only `CREATE ... IF NOT EXISTS` statements, so
//! existing tables and their rows are never touched.

use serde::Serialize;
use tracing::{error, info};

use super::pool::DbPool;
use crate::error::Result;

/// A table this application expects to exist
#[derive(Debug, Clone, Copy)]
pub struct DeclaredTable {
    pub name: &'static str,
    pub ddl: &'static str,
}

pub const DECLARED_TABLES: &[DeclaredTable] = &[
    DeclaredTable {
        name: "employees",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS employees (
            employee_id TEXT NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT,
            department TEXT,
            designation TEXT,
            manager_id TEXT,
            date_of_joining DATE,
            salary NUMERIC,
            status TEXT NOT NULL DEFAULT 'active',
            PRIMARY KEY (employee_id)
        )
        "#,
    },
    DeclaredTable {
        name: "projects",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS projects (
            project_code TEXT NOT NULL,
            project_name TEXT NOT NULL,
            client TEXT,
            start_date DATE,
            end_date DATE,
            status TEXT NOT NULL DEFAULT 'active',
            PRIMARY KEY (project_code)
        )
        "#,
    },
    DeclaredTable {
        name: "allocations",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS allocations (
            employee_id TEXT NOT NULL,
            project_code TEXT NOT NULL,
            allocation_percent DOUBLE PRECISION NOT NULL,
            start_date DATE NOT NULL,
            end_date DATE,
            billable BOOLEAN NOT NULL DEFAULT TRUE,
            PRIMARY KEY (employee_id, project_code, start_date)
        )
        "#,
    },
    DeclaredTable {
        name: "timesheets",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS timesheets (
            employee_id TEXT NOT NULL,
            work_date DATE NOT NULL,
            project_code TEXT,
            task TEXT NOT NULL,
            hours DOUBLE PRECISION NOT NULL
        )
        "#,
    },
    DeclaredTable {
        name: "activity_logs",
        ddl: r#"
        CREATE TABLE IF NOT EXISTS activity_logs (
            id BIGSERIAL PRIMARY KEY,
            occurred_at TIMESTAMPTZ DEFAULT now(),
            action TEXT,
            target TEXT,
            detail TEXT,
            outcome TEXT
        )
        "#,
    },
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_employees_department ON employees(department)",
    "CREATE INDEX IF NOT EXISTS idx_allocations_project ON allocations(project_code)",
    "CREATE INDEX IF NOT EXISTS idx_timesheets_employee_date ON timesheets(employee_id, work_date)",
    "CREATE INDEX IF NOT EXISTS idx_activity_logs_occurred_at ON activity_logs(occurred_at DESC)",
];

/// Outcome of [`bootstrap`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapStatus {
    Ready,
    /// Tables could not be ensured; the process keeps running and
    /// table-dependent operations report their own errors.
    Degraded { reason: String },
}

impl BootstrapStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Create every declared table and index in one transaction.
pub async fn ensure_tables(pool: &DbPool) -> Result<()> {
    info!("Ensuring HR tables exist...");

    let mut tx = pool.begin().await?;
    for table in DECLARED_TABLES {
        sqlx::query(table.ddl).execute(&mut *tx).await?;
        tracing::debug!(table = table.name, "table ensured");
    }
    for index in INDEXES {
        sqlx::query(index).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(tables = DECLARED_TABLES.len(), "HR tables ready");
    Ok(())
}

/// [`ensure_tables`], with failures logged and downgraded to a status.
pub async fn bootstrap(pool: &DbPool) -> BootstrapStatus {
    match ensure_tables(pool).await {
        Ok(()) => BootstrapStatus::Ready,
        Err(e) => {
            error!(error = %e, "table bootstrap failed; continuing in degraded mode");
            BootstrapStatus::Degraded {
                reason: e.to_string(),
            }
        }
    }
}
