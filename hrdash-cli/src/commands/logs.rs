//! `hrdash logs`: recent activity

use anyhow::Result;
use clap::Parser;
use hrdash_core::{ActivityEntry, ActivityLog, Table, Value};

use super::Session;
use crate::output::{render_table, to_json, OutputFormat};

#[derive(Parser, Debug)]
pub struct LogsArgs {
    /// Number of entries, newest first
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: i64,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub async fn run(session: &Session, args: LogsArgs) -> Result<()> {
    let config = session.config()?;
    let pool = session.connect(&config).await?;
    let entries = ActivityLog::new(&pool).recent(args.limit).await?;
    pool.close().await;

    match args.output {
        OutputFormat::Json => print!("{}", to_json(&entries)?),
        format => print!("{}", render_table(&entries_table(&entries), format)?),
    }
    Ok(())
}

fn entries_table(entries: &[ActivityEntry]) -> Table {
    let text = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);

    let mut table = Table::new(
        ["time", "action", "target", "outcome", "detail"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    for entry in entries {
        table.rows.push(vec![
            entry
                .occurred_at
                .map(|t| Value::Timestamp(t.naive_utc()))
                .unwrap_or(Value::Null),
            text(&entry.action),
            text(&entry.target),
            text(&entry.outcome),
            text(&entry.detail),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_render_as_null() {
        let entries = vec![ActivityEntry {
            id: 1,
            occurred_at: None,
            action: Some("upload".into()),
            target: None,
            detail: Some("3 rows".into()),
            outcome: Some("success".into()),
        }];
        let table = entries_table(&entries);
        assert_eq!(table.columns.len(), 5);
        assert_eq!(table.rows[0][0], Value::Null);
        assert_eq!(table.rows[0][1], Value::Text("upload".into()));
        assert_eq!(table.rows[0][2], Value::Null);
    }
}
