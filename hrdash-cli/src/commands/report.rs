//! `hrdash report list | run`

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use hrdash_core::reports::{catalogue, ReportDef};
use hrdash_core::{run_report, Action, ActivityLog, Outcome};

use super::Session;
use crate::output::{render_table, to_json, OutputFormat};
use crate::ui;

#[derive(Parser, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub command: ReportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Show the available reports and their parameters
    List {
        /// Print the catalogue as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a report
    Run {
        /// Report name (see `hrdash report list`)
        name: String,

        /// Report parameter, repeatable: -p from=2024-01-01
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Output format
        #[arg(long, short = 'o', value_enum, default_value_t)]
        output: OutputFormat,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub async fn run(session: &Session, args: ReportArgs) -> Result<()> {
    match args.command {
        ReportCommand::List { json } => {
            if json {
                print!("{}", to_json(catalogue())?);
            } else {
                print!("{}", describe_catalogue(catalogue()));
            }
            Ok(())
        }
        ReportCommand::Run {
            name,
            params,
            output,
        } => run_one(session, &name, params, output).await,
    }
}

async fn run_one(
    session: &Session,
    name: &str,
    params: Vec<(String, String)>,
    output: OutputFormat,
) -> Result<()> {
    let mut map = BTreeMap::new();
    for (key, value) in params {
        if map.insert(key.clone(), value).is_some() {
            return Err(anyhow!("parameter '{}' given more than once", key));
        }
    }

    // Fail on an unknown report or bad parameters before connecting
    let report = hrdash_core::reports::find(name)?;
    hrdash_core::reports::resolve_params(report, &map)?;

    let config = session.config()?;
    let pool = session.connect(&config).await?;

    let result = ui::with_spinner_async(
        format!("Running {}", report.title),
        "Report finished",
        run_report(&pool, name, &map),
    )
    .await;

    let detail = map
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    ActivityLog::new(&pool)
        .record(Action::Report, name, &detail, Outcome::of(&result))
        .await;
    pool.close().await;

    print!("{}", render_table(&result?, output)?);
    Ok(())
}

fn describe_catalogue(reports: &[ReportDef]) -> String {
    let mut out = String::new();
    for report in reports {
        out.push_str(&format!("{:<24} {}\n", report.name, report.title));
        for param in report.params {
            let mut line = format!("    {} ({:?}", param.name, param.kind);
            if param.required {
                line.push_str(", required");
            }
            if let Some(default) = param.default {
                line.push_str(&format!(", default {}", default));
            }
            line.push_str(&format!(") {}\n", param.description));
            out.push_str(&line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_params() {
        assert_eq!(
            parse_param("from=2024-01-01").unwrap(),
            ("from".to_string(), "2024-01-01".to_string())
        );
        assert_eq!(
            parse_param("department=").unwrap(),
            ("department".to_string(), String::new())
        );
        assert!(parse_param("from").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn catalogue_listing_mentions_parameters() {
        let text = describe_catalogue(catalogue());
        assert!(text.contains("new_joiners"));
        assert!(text.contains("from (Date, required)"));
        assert!(text.contains("threshold"));
    }
}
