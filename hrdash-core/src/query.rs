//! Read-only execution of ad-hoc SQL and decoding of Postgres rows

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::PgRow;
use sqlx::{Column as _, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assistant::guard::SqlGuard;
use crate::dataset::{Table, Value};
use crate::db::DbPool;
use crate::error::{HrError, Result};

/// Result of a guarded ad-hoc query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// SQL as executed (normalized by the guard)
    pub sql: String,
    pub table: Table,
    /// More rows were available than the row cap allowed
    pub truncated: bool,
}

/// Check `sql` with `guard`, then run it in a `READ ONLY` transaction that
/// is always rolled back. At most `max_rows` rows are returned.
pub async fn run_read_only(
    pool: &DbPool,
    sql: &str,
    guard: &SqlGuard,
    max_rows: usize,
) -> Result<QueryOutcome> {
    let sql = guard.check(sql)?;
    debug!(%sql, "running read-only query");

    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION READ ONLY")
        .execute(&mut *tx)
        .await?;

    let (columns, rows, truncated) = {
        let mut stream = sqlx::query(&sql).fetch(&mut *tx);
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut truncated = false;

        while let Some(row) = stream.try_next().await.map_err(HrError::from_query)? {
            if columns.is_none() {
                columns = Some(column_names(&row));
            }
            if rows.len() == max_rows {
                truncated = true;
                break;
            }
            rows.push(decode_row(&row)?);
        }

        (columns, rows, truncated)
    };

    // No row to read names from: ask the server for the statement's columns
    let columns = match columns {
        Some(columns) => columns,
        None => (&mut *tx)
            .describe(&sql)
            .await
            .map_err(HrError::from_query)?
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    };
    let table = Table { columns, rows };

    tx.rollback().await?;
    info!(rows = table.len(), truncated, "read-only query finished");

    Ok(QueryOutcome {
        sql,
        table,
        truncated,
    })
}

/// Collect fetched rows into a [`Table`], falling back to `columns` for the
/// header when there are no rows to read names from.
pub(crate) fn rows_to_table(rows: &[PgRow], columns: &[&str]) -> Result<Table> {
    let names = match rows.first() {
        Some(row) => column_names(row),
        None => columns.iter().map(|c| c.to_string()).collect(),
    };
    let mut table = Table::new(names);
    for row in rows {
        table.rows.push(decode_row(row)?);
    }
    Ok(table)
}

pub fn column_names(row: &PgRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Decode every column of a row by its Postgres type name.
///
/// Intervals, uuids, JSON and the common array types are rendered as text
/// in Postgres' own notation. Anything else is read as text when the
/// driver allows it, otherwise rendered as `<TYPE>`.
pub fn decode_row(row: &PgRow) -> Result<Vec<Value>> {
    (0..row.len()).map(|index| decode_value(row, index)).collect()
}

fn decode_value(row: &PgRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index).map_err(HrError::from_query)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(index).map_err(HrError::from_query)?)),
        "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(index).map_err(HrError::from_query)?)),
        "INT8" => Value::Int(row.try_get::<i64, _>(index).map_err(HrError::from_query)?),
        "FLOAT4" => {
            Value::Float(f64::from(row.try_get::<f32, _>(index).map_err(HrError::from_query)?))
        }
        "FLOAT8" => Value::Float(row.try_get::<f64, _>(index).map_err(HrError::from_query)?),
        "NUMERIC" => {
            Value::Decimal(row.try_get::<Decimal, _>(index).map_err(HrError::from_query)?)
        }
        "BOOL" => Value::Bool(row.try_get::<bool, _>(index).map_err(HrError::from_query)?),
        "DATE" => Value::Date(row.try_get::<NaiveDate, _>(index).map_err(HrError::from_query)?),
        "TIMESTAMP" => Value::Timestamp(
            row.try_get::<NaiveDateTime, _>(index)
                .map_err(HrError::from_query)?,
        ),
        "TIMESTAMPTZ" => Value::Timestamp(
            row.try_get::<DateTime<Utc>, _>(index)
                .map_err(HrError::from_query)?
                .naive_utc(),
        ),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            Value::Text(row.try_get::<String, _>(index).map_err(HrError::from_query)?)
        }
        "INTERVAL" => Value::Text(format_interval(
            &row.try_get::<PgInterval, _>(index).map_err(HrError::from_query)?,
        )),
        "UUID" => Value::Text(
            row.try_get::<Uuid, _>(index)
                .map_err(HrError::from_query)?
                .to_string(),
        ),
        "JSON" | "JSONB" => Value::Text(
            row.try_get::<serde_json::Value, _>(index)
                .map_err(HrError::from_query)?
                .to_string(),
        ),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "CHAR[]" | "NAME[]" => Value::Text(format_array(
            &row.try_get::<Vec<Option<String>>, _>(index).map_err(HrError::from_query)?,
        )),
        "INT2[]" => Value::Text(format_array(
            &row.try_get::<Vec<Option<i16>>, _>(index).map_err(HrError::from_query)?,
        )),
        "INT4[]" => Value::Text(format_array(
            &row.try_get::<Vec<Option<i32>>, _>(index).map_err(HrError::from_query)?,
        )),
        "INT8[]" => Value::Text(format_array(
            &row.try_get::<Vec<Option<i64>>, _>(index).map_err(HrError::from_query)?,
        )),
        other => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
                Value::Text(text)
            }
            _ => Value::Text(format!("<{}>", other)),
        },
    };
    Ok(value)
}

/// Postgres' default `IntervalStyle`: `1 year 2 mons 3 days 04:05:06`
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    for (amount, unit) in [(years, "year"), (months, "mon"), (interval.days, "day")] {
        if amount != 0 {
            let plural = if amount == 1 { "" } else { "s" };
            parts.push(format!("{} {}{}", amount, unit, plural));
        }
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// `{a,b,NULL}`
fn format_array<T: std::fmt::Display>(items: &[Option<T>]) -> String {
    let rendered: Vec<String> = items
        .iter()
        .map(|item| match item {
            Some(v) => v.to_string(),
            None => "NULL".to_string(),
        })
        .collect();
    format!("{{{}}}", rendered.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[tokio::test]
    async fn guard_runs_before_any_connection_attempt() {
        let mut config = DatabaseConfig::default();
        config.port = 1;
        config.min_connections = 0;
        let pool = DbPool::connect_lazy(&config);

        let err = run_read_only(&pool, "DROP TABLE employees", &SqlGuard::new(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, HrError::QueryRejected { .. }));
    }

    #[test]
    fn empty_row_set_decodes_to_empty_table() {
        let table = rows_to_table(&[], &["department", "headcount"]).unwrap();
        assert_eq!(table.columns, vec!["department", "headcount"]);
        assert!(table.is_empty());
    }

    #[test]
    fn intervals_render_like_postgres() {
        let tenure = PgInterval {
            months: 14,
            days: 3,
            microseconds: 0,
        };
        assert_eq!(format_interval(&tenure), "1 year 2 mons 3 days");

        let shift = PgInterval {
            months: 0,
            days: 1,
            microseconds: (4 * 3600 + 5 * 60 + 6) * 1_000_000 + 500_000,
        };
        assert_eq!(format_interval(&shift), "1 day 04:05:06.5");

        let zero = PgInterval {
            months: 0,
            days: 0,
            microseconds: 0,
        };
        assert_eq!(format_interval(&zero), "00:00:00");

        let back = PgInterval {
            months: -1,
            days: 0,
            microseconds: -90 * 1_000_000,
        };
        assert_eq!(format_interval(&back), "-1 mons -00:01:30");
    }

    #[test]
    fn arrays_render_in_brace_notation() {
        assert_eq!(format_array(&[Some(1i64), None, Some(3)]), "{1,NULL,3}");
        assert_eq!(format_array::<String>(&[]), "{}");
    }
}
