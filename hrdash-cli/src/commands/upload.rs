//! `hrdash upload`: load a file into a table

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hrdash_core::{
    Action, ActivityLog, FileFormat, IngestOptions, IngestReport, Ingestor, MalformedPolicy,
    Outcome, WriteMode,
};

use super::Session;
use crate::output::to_json;
use crate::ui;

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// CSV, TSV or spreadsheet file (xlsx, xls, xlsm, xlsb, ods)
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Target table; created from the file's columns if it does not exist
    #[arg(long, short = 't')]
    pub table: String,

    /// append, upsert (by primary key) or replace (default from config)
    #[arg(long)]
    pub mode: Option<WriteMode>,

    /// skip malformed rows with a warning, or fail the whole upload
    #[arg(long, value_name = "POLICY")]
    pub on_malformed: Option<MalformedPolicy>,

    /// Worksheet to read (default: the first one)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Override the format implied by the file extension
    #[arg(long)]
    pub format: Option<FileFormat>,

    /// Print the ingest report as JSON
    #[arg(long)]
    pub json: bool,
}

impl UploadArgs {
    fn options(&self, defaults: IngestOptions) -> IngestOptions {
        IngestOptions {
            mode: self.mode.unwrap_or(defaults.mode),
            on_malformed: self.on_malformed.unwrap_or(defaults.on_malformed),
            sheet: self.sheet.clone(),
            ..defaults
        }
    }
}

pub async fn run(session: &Session, args: UploadArgs) -> Result<()> {
    let format = match args.format {
        Some(format) => format,
        None => FileFormat::from_path(&args.file)?,
    };
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let config = session.config()?;
    let options = args.options(IngestOptions::from(&config.ingest));
    let pool = session.connect(&config).await?;

    let result = ui::with_spinner_async(
        format!("Loading {} into {}", args.file.display(), args.table),
        "Upload finished",
        Ingestor::new(&pool, options).ingest_bytes(bytes, format, &args.table),
    )
    .await;

    let detail = match &result {
        Ok(report) => format!("{} ({} rows)", args.file.display(), report.rows_written),
        Err(e) => format!("{}: {}", args.file.display(), e),
    };
    ActivityLog::new(&pool)
        .record(Action::Upload, &args.table, &detail, Outcome::of(&result))
        .await;
    pool.close().await;

    let report = result?;
    if args.json {
        print!("{}", to_json(&report)?);
    } else {
        print!("{}", summarize(&report));
    }
    Ok(())
}

fn summarize(report: &IngestReport) -> String {
    let mut out = format!(
        "{} of {} rows written to {} ({})",
        report.rows_written, report.rows_read, report.table, report.mode
    );
    if report.created_table {
        out.push_str(", table created");
    }
    out.push('\n');

    if !report.ignored_columns.is_empty() {
        out.push_str(&format!(
            "ignored columns: {}\n",
            report.ignored_columns.join(", ")
        ));
    }
    for warning in &report.warnings {
        out.push_str(&format!("  {}\n", warning));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdash_core::ingest::RowWarning;

    #[test]
    fn flags_override_configured_defaults() {
        let args = UploadArgs {
            file: "staff.csv".into(),
            table: "employees".into(),
            mode: Some(WriteMode::Replace),
            on_malformed: None,
            sheet: None,
            format: None,
            json: false,
        };
        let defaults = IngestOptions {
            on_malformed: MalformedPolicy::FailFast,
            ..IngestOptions::default()
        };
        let options = args.options(defaults);
        assert_eq!(options.mode, WriteMode::Replace);
        assert_eq!(options.on_malformed, MalformedPolicy::FailFast);
    }

    #[test]
    fn summary_lists_warnings() {
        let report = IngestReport {
            table: "transactions".into(),
            rows_read: 3,
            rows_written: 2,
            created_table: true,
            mode: WriteMode::Append,
            warnings: vec![RowWarning {
                line: 3,
                reason: "amount: 'abc' is not a number".into(),
            }],
            ignored_columns: vec![],
        };
        let text = summarize(&report);
        assert!(text.starts_with("2 of 3 rows written to transactions (append), table created"));
        assert!(text.contains("line 3: amount: 'abc' is not a number"));
    }
}
