//! `hrdash tables [NAME]`

use anyhow::{Context, Result};
use clap::Parser;
use hrdash_core::dataset::Ident;
use hrdash_core::db::catalog;
use hrdash_core::{Table, Value};

use super::Session;
use crate::output::{render_table, to_json, OutputFormat};

#[derive(Parser, Debug)]
pub struct TablesArgs {
    /// Describe this table instead of listing all of them
    pub name: Option<String>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub async fn run(session: &Session, args: TablesArgs) -> Result<()> {
    let config = session.config()?;
    let pool = session.connect(&config).await?;

    match args.name {
        None => {
            let summaries = catalog::table_summaries(&pool).await?;
            if args.output == OutputFormat::Json {
                print!("{}", to_json(&summaries)?);
            } else {
                let mut table = Table::new(vec!["table".into(), "columns".into()]);
                for summary in &summaries {
                    table.rows.push(vec![
                        Value::Text(summary.name.clone()),
                        Value::Int(summary.columns.len() as i64),
                    ]);
                }
                print!("{}", render_table(&table, args.output)?);
            }
        }
        Some(name) => {
            let ident = Ident::new(&name)?;
            let schema = catalog::describe_table(&pool, &ident)
                .await?
                .with_context(|| format!("table '{}' does not exist", ident))?;
            let rows = catalog::row_count(&pool, &ident).await?;

            if args.output == OutputFormat::Json {
                print!("{}", to_json(&schema)?);
            } else {
                let mut table = Table::new(vec![
                    "column".into(),
                    "type".into(),
                    "nullable".into(),
                    "default".into(),
                    "key".into(),
                ]);
                for column in &schema.columns {
                    table.rows.push(vec![
                        Value::Text(column.name.to_string()),
                        Value::Text(column.ty.as_str().to_string()),
                        Value::Bool(column.nullable),
                        Value::Bool(column.has_default),
                        Value::Bool(schema.is_key(column.name.as_str())),
                    ]);
                }
                print!("{}", render_table(&table, args.output)?);
                if args.output == OutputFormat::Text {
                    println!("{}: {} rows", ident, rows);
                }
            }
        }
    }

    pool.close().await;
    Ok(())
}
