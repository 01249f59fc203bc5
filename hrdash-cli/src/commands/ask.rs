//! `hrdash ask QUESTION`

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hrdash_core::{Action, ActivityLog, GeminiClient, Outcome, QueryAssistant};

use super::Session;
use crate::output::{render_table, to_json, OutputFormat};
use crate::ui;

#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Question about the data, e.g. "total amount by name"
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub async fn run(session: &Session, args: AskArgs) -> Result<()> {
    let question = args.question.join(" ");

    let config = session.config()?;
    let client = GeminiClient::new(&config.assistant).context("query assistant unavailable")?;
    let pool = session.connect(&config).await?;

    let assistant = QueryAssistant::new(pool.clone(), Arc::new(client), config.assistant.max_rows);
    let result = ui::with_spinner_async("Thinking", "Answered", assistant.ask(&question)).await;

    let detail = match &result {
        Ok(answer) => answer.sql.clone(),
        Err(e) => e.to_string(),
    };
    ActivityLog::new(&pool)
        .record(Action::Ask, &question, &detail, Outcome::of(&result))
        .await;
    pool.close().await;

    let answer = result?;
    match args.output {
        OutputFormat::Json => print!("{}", to_json(&answer)?),
        OutputFormat::Csv => print!("{}", render_table(&answer.table, OutputFormat::Csv)?),
        OutputFormat::Text => {
            println!("SQL: {}\n", answer.sql);
            print!("{}", render_table(&answer.table, OutputFormat::Text)?);
        }
    }
    if answer.truncated {
        eprintln!("(result truncated at {} rows)", config.assistant.max_rows);
    }
    Ok(())
}
