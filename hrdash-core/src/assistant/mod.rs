//! Natural-language query assistant
//!
//! question → prompt (with the available tables) → [`SqlGenerator`] →
//! SQL extraction → [`SqlGuard`] → read-only execution.

pub mod client;
pub mod guard;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::dataset::Table;
use crate::db::{catalog, DbPool, TableSummary};
use crate::error::{HrError, Result};
use crate::query::run_read_only;

pub use client::{GeminiClient, SqlGenerator};
pub use guard::SqlGuard;

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("invalid code fence regex")
});

static SQL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*sql\s*:\s*").expect("invalid SQL prefix regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantAnswer {
    pub question: String,
    pub sql: String,
    pub table: Table,
    pub truncated: bool,
}

/// SQL the assistant produced, checked but not yet executed
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    pub sql: String,
    pub guard: SqlGuard,
}

pub struct QueryAssistant {
    pool: DbPool,
    generator: Arc<dyn SqlGenerator>,
    max_rows: usize,
}

impl QueryAssistant {
    pub fn new(pool: DbPool, generator: Arc<dyn SqlGenerator>, max_rows: usize) -> Self {
        Self {
            pool,
            generator,
            max_rows,
        }
    }

    /// Answer `question` with a table. Generated SQL that is not a single
    /// read-only query over the available tables is rejected unexecuted.
    pub async fn ask(&self, question: &str) -> Result<AssistantAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(HrError::invalid_parameter("question", "must not be empty"));
        }

        let tables = catalog::table_summaries(&self.pool).await?;
        let planned = plan(self.generator.as_ref(), question, &tables).await?;
        info!(sql = %planned.sql, "assistant generated query");

        let outcome = run_read_only(&self.pool, &planned.sql, &planned.guard, self.max_rows).await?;

        Ok(AssistantAnswer {
            question: question.to_string(),
            sql: outcome.sql,
            table: outcome.table,
            truncated: outcome.truncated,
        })
    }
}

/// Everything up to execution: prompt, generate, extract, guard.
pub async fn plan(
    generator: &dyn SqlGenerator,
    question: &str,
    tables: &[TableSummary],
) -> Result<PlannedQuery> {
    if tables.is_empty() {
        return Err(HrError::assistant(
            "no tables are available yet; upload data first",
        ));
    }

    let prompt = build_prompt(question, tables);
    let reply = generator.generate(&prompt).await?;
    let sql = extract_sql(&reply)
        .ok_or_else(|| HrError::assistant("the model reply did not contain SQL"))?;

    let guard = SqlGuard::with_allowed_tables(tables.iter().map(|t| t.name.as_str()));
    let sql = guard.check(&sql).map_err(|e| {
        warn!(%sql, error = %e, "assistant produced a rejected query");
        e
    })?;

    Ok(PlannedQuery { sql, guard })
}

pub fn build_prompt(question: &str, tables: &[TableSummary]) -> String {
    let mut prompt = String::from(
        "You translate questions about an HR database into PostgreSQL.\n\
         Rules:\n\
         - Reply with exactly one SELECT statement and nothing else.\n\
         - Never modify data or schema (no INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, TRUNCATE).\n\
         - Only use the tables and columns listed below.\n\n\
         Tables:\n",
    );

    for table in tables {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        prompt.push_str(&format!("- {}({})\n", table.name, columns.join(", ")));
    }

    prompt.push_str(&format!("\nQuestion: {}\nSQL:", question));
    prompt
}

/// Pull the SQL out of a model reply: code fences, a leading `SQL:` label
/// and trailing semicolons are removed. `None` when nothing is left.
pub fn extract_sql(reply: &str) -> Option<String> {
    let body = CODE_FENCE_RE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);

    let body = SQL_PREFIX_RE.replace(body, "");
    let sql = body
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .trim();

    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::ColumnSummary;
    use async_trait::async_trait;

    /// Returns a canned reply and remembers the prompt it was given
    struct Canned {
        reply: String,
        prompt: std::sync::Mutex<Option<String>>,
    }

    impl Canned {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompt: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SqlGenerator for Canned {
        async fn generate(&self, prompt: &str) -> Result<String> {
            *self.prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn transactions() -> Vec<TableSummary> {
        vec![TableSummary {
            name: "transactions".into(),
            columns: vec![
                ColumnSummary {
                    name: "name".into(),
                    data_type: "text".into(),
                },
                ColumnSummary {
                    name: "amount".into(),
                    data_type: "double precision".into(),
                },
            ],
        }]
    }

    #[test]
    fn extract_from_fenced_reply() {
        let reply = "Here you go:\n```sql\nSELECT name FROM transactions;\n```\nEnjoy";
        assert_eq!(extract_sql(reply).unwrap(), "SELECT name FROM transactions");
    }

    #[test]
    fn extract_from_labelled_reply() {
        assert_eq!(
            extract_sql("SQL: SELECT 1;;").unwrap(),
            "SELECT 1"
        );
        assert_eq!(extract_sql("  select 1  ").unwrap(), "select 1");
        assert!(extract_sql("```\n```").is_none());
        assert!(extract_sql("   ").is_none());
    }

    #[test]
    fn prompt_lists_tables_and_question() {
        let prompt = build_prompt("total amount by name", &transactions());
        assert!(prompt.contains("- transactions(name text, amount double precision)"));
        assert!(prompt.contains("Question: total amount by name"));
        assert!(prompt.contains("exactly one SELECT"));
    }

    #[tokio::test]
    async fn plan_accepts_read_only_sql() {
        let generator = Canned::new("```sql\nSELECT name, SUM(amount) AS total FROM transactions GROUP BY name;\n```");
        let planned = plan(&generator, "total amount by name", &transactions())
            .await
            .unwrap();
        assert_eq!(
            planned.sql,
            "SELECT name, SUM(amount) AS total FROM transactions GROUP BY name"
        );
        let prompt = generator.prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("transactions"));
    }

    #[tokio::test]
    async fn plan_never_passes_destructive_sql() {
        for reply in [
            "DROP TABLE transactions",
            "DELETE FROM transactions",
            "UPDATE transactions SET amount = 0",
            "SELECT name FROM transactions; DROP TABLE transactions",
            "WITH x AS (DELETE FROM transactions RETURNING *) SELECT * FROM x",
        ] {
            let generator = Canned::new(reply);
            let err = plan(&generator, "total amount by name", &transactions())
                .await
                .unwrap_err();
            assert!(
                matches!(err, HrError::QueryRejected { .. }),
                "{reply:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn plan_rejects_tables_outside_catalog() {
        let generator = Canned::new("SELECT * FROM salaries");
        let err = plan(&generator, "who earns most", &transactions())
            .await
            .unwrap_err();
        assert!(matches!(err, HrError::QueryRejected { .. }));
    }

    #[tokio::test]
    async fn plan_without_tables_is_an_error() {
        let generator = Canned::new("SELECT 1");
        let err = plan(&generator, "anything", &[]).await.unwrap_err();
        assert!(matches!(err, HrError::Assistant { .. }));
        assert!(generator.prompt.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_reply_is_an_assistant_error() {
        let generator = Canned::new("```\n```");
        let err = plan(&generator, "anything", &transactions())
            .await
            .unwrap_err();
        assert!(matches!(err, HrError::Assistant { .. }));
    }
}
