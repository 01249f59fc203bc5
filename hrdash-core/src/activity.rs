//! Audit trail of dashboard actions in `activity_logs`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::warn;

use crate::db::DbPool;
use crate::error::Result;

/// Longest detail text stored per entry
const MAX_DETAIL_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Upload,
    Report,
    Query,
    Ask,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Report => "report",
            Self::Query => "query",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub occurred_at: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub target: Option<String>,
    pub detail: Option<String>,
    pub outcome: Option<String>,
}

/// Repository over `activity_logs`
pub struct ActivityLog<'a> {
    pool: &'a DbPool,
}

impl<'a> ActivityLog<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Append an entry. Failures are logged and swallowed so that a broken
    /// audit table never fails the action being audited.
    pub async fn record(&self, action: Action, target: &str, detail: &str, outcome: Outcome) {
        let detail = clip_detail(detail);
        let result = sqlx::query(
            r#"
            INSERT INTO activity_logs (action, target, detail, outcome)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(action.as_str())
        .bind(target)
        .bind(&*detail)
        .bind(outcome.as_str())
        .execute(self.pool.inner())
        .await;

        if let Err(e) = result {
            warn!(action = %action, subject = target, error = %e, "failed to record activity");
        }
    }

    /// Newest entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT id, occurred_at, action, target, detail, outcome
            FROM activity_logs
            ORDER BY occurred_at DESC NULLS LAST, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 1000))
        .fetch_all(self.pool.inner())
        .await?;
        Ok(entries)
    }
}

fn clip_detail(detail: &str) -> std::borrow::Cow<'_, str> {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return std::borrow::Cow::Borrowed(detail);
    }
    let mut clipped: String = detail.chars().take(MAX_DETAIL_CHARS - 1).collect();
    clipped.push('…');
    std::borrow::Cow::Owned(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_result() {
        assert_eq!(Outcome::of::<(), ()>(&Ok(())), Outcome::Success);
        assert_eq!(Outcome::of::<(), &str>(&Err("boom")), Outcome::Failure);
    }

    #[test]
    fn long_details_are_clipped() {
        let long = "x".repeat(5000);
        let clipped = clip_detail(&long);
        assert_eq!(clipped.chars().count(), MAX_DETAIL_CHARS);
        assert!(clipped.ends_with('…'));
        assert_eq!(clip_detail("short"), "short");
    }

    #[tokio::test]
    async fn record_never_fails_the_caller() {
        let mut config = crate::config::DatabaseConfig::default();
        config.port = 1;
        config.min_connections = 0;
        config.acquire_timeout_secs = 1;
        let pool = DbPool::connect_lazy(&config);

        // Returns unit even though the database is unreachable
        ActivityLog::new(&pool)
            .record(Action::Query, "employees", "SELECT 1", Outcome::Success)
            .await;
    }
}
