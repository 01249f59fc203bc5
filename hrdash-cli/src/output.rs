//! Rendering of result tables on stdout

use anyhow::{Context, Result};
use clap::ValueEnum;
use hrdash_core::Table;
use serde::Serialize;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned columns
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// CSV with a header row
    Csv,
}

pub fn render_table(table: &Table, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(table.render_text()),
        OutputFormat::Json => to_json(table),
        OutputFormat::Csv => table.to_csv().context("failed to render CSV"),
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdash_core::Value;

    fn sample() -> Table {
        Table {
            columns: vec!["department".into(), "headcount".into()],
            rows: vec![vec![Value::Text("Sales".into()), Value::Int(2)]],
        }
    }

    #[test]
    fn renders_each_format() {
        let table = sample();
        assert!(render_table(&table, OutputFormat::Text)
            .unwrap()
            .contains("Sales"));
        assert_eq!(
            render_table(&table, OutputFormat::Csv).unwrap(),
            "department,headcount\nSales,2\n"
        );
        let json: serde_json::Value =
            serde_json::from_str(&render_table(&table, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["rows"][0][1], 2);
    }
}
