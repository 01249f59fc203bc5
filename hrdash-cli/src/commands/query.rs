//! `hrdash query SQL`

use anyhow::Result;
use clap::Parser;
use hrdash_core::{run_read_only, Action, ActivityLog, Outcome, SqlGuard};

use super::Session;
use crate::output::{render_table, to_json, OutputFormat};

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// A single SELECT (or WITH ... SELECT) statement
    pub sql: String,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,

    /// Row cap (default from config)
    #[arg(long)]
    pub max_rows: Option<usize>,
}

pub async fn run(session: &Session, args: QueryArgs) -> Result<()> {
    // Rejected SQL never needs a connection
    let guard = SqlGuard::new();
    guard.check(&args.sql)?;

    let config = session.config()?;
    let max_rows = args.max_rows.unwrap_or(config.assistant.max_rows);
    let pool = session.connect(&config).await?;

    let result = run_read_only(&pool, &args.sql, &guard, max_rows).await;
    let detail = match &result {
        Ok(outcome) => format!("{} rows", outcome.table.len()),
        Err(e) => e.to_string(),
    };
    ActivityLog::new(&pool)
        .record(Action::Query, &args.sql, &detail, Outcome::of(&result))
        .await;
    pool.close().await;

    let outcome = result?;
    match args.output {
        OutputFormat::Json => print!("{}", to_json(&outcome)?),
        format => print!("{}", render_table(&outcome.table, format)?),
    }
    if outcome.truncated {
        eprintln!("(result truncated at {} rows)", max_rows);
    }
    Ok(())
}
