//! Table and column metadata from `information_schema`

use serde::Serialize;
use sqlx::Row;
use tracing::debug;

use super::pool::DbPool;
use crate::dataset::{quote_ident, Column, ColumnType, Ident, Schema};
use crate::error::Result;

/// Name and column list, used to describe the database to the assistant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
}

/// Tables and views in the `public` schema, sorted by name
pub async fn list_tables(pool: &DbPool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = 'public'
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool.inner())
    .await?;
    Ok(names)
}

/// Every public table with its columns in ordinal order
pub async fn table_summaries(pool: &DbPool) -> Result<Vec<TableSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT c.table_name::text AS table_name,
               c.column_name::text AS column_name,
               c.data_type::text AS data_type
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE c.table_schema = 'public'
        ORDER BY c.table_name, c.ordinal_position
        "#,
    )
    .fetch_all(pool.inner())
    .await?;

    let mut summaries: Vec<TableSummary> = Vec::new();
    for row in rows {
        let table: String = row.try_get("table_name")?;
        let column = ColumnSummary {
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
        };
        match summaries.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => summaries.push(TableSummary {
                name: table,
                columns: vec![column],
            }),
        }
    }
    Ok(summaries)
}

/// Columns and primary key of `table`, or `None` if it does not exist.
pub async fn describe_table(pool: &DbPool, table: &Ident) -> Result<Option<Schema>> {
    let rows = sqlx::query(
        r#"
        SELECT column_name::text AS column_name,
               data_type::text AS data_type,
               udt_schema::text AS udt_schema,
               udt_name::text AS udt_name,
               is_nullable = 'YES' AS nullable,
               column_default IS NOT NULL AS has_default
        FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table.as_str())
    .fetch_all(pool.inner())
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let Some(ident) = column_ident(&name) else {
            debug!(table = %table, column = %name, "skipping column with non-standard name");
            continue;
        };
        let data_type: String = row.try_get("data_type")?;
        let udt_schema: String = row.try_get("udt_schema")?;
        let udt_name: String = row.try_get("udt_name")?;

        let mut column = Column::new(ident, ColumnType::from_pg_data_type(&data_type));
        column.nullable = row.try_get("nullable")?;
        column.has_default = row.try_get("has_default")?;
        column.cast_to = text_cast(&data_type, &udt_schema, &udt_name);
        columns.push(column);
    }

    let key_names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
         AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = 'public'
          AND tc.table_name = $1
        ORDER BY kcu.ordinal_position
        "#,
    )
    .bind(table.as_str())
    .fetch_all(pool.inner())
    .await?;

    let primary_key = key_names.iter().filter_map(|name| column_ident(name)).collect();

    Ok(Some(Schema::new(columns).with_primary_key(primary_key)))
}

/// Identifier for a catalog column name, or `None` when the stored name
/// differs from its folded form. Quoted mixed-case or spaced names can
/// never match a normalized header.
fn column_ident(name: &str) -> Option<Ident> {
    Ident::new(name).ok().filter(|ident| ident.as_str() == name)
}

/// Cast target for a column read as text whose server type does not
/// accept a text value on insert
fn text_cast(data_type: &str, udt_schema: &str, udt_name: &str) -> Option<String> {
    if ColumnType::from_pg_data_type(data_type) != ColumnType::Text {
        return None;
    }
    match data_type {
        "text" | "character varying" | "character" | "name" => None,
        _ => Some(format!("{}.{}", quote_ident(udt_schema), quote_ident(udt_name))),
    }
}

pub async fn row_count(pool: &DbPool, table: &Ident) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.quoted());
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool.inner()).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_case_names_are_skipped() {
        assert_eq!(column_ident("amount").unwrap().as_str(), "amount");
        assert!(column_ident("Amount").is_none());
        assert!(column_ident("pay grade").is_none());
    }

    #[test]
    fn non_text_types_read_as_text_get_a_cast() {
        assert_eq!(
            text_cast("uuid", "pg_catalog", "uuid").as_deref(),
            Some("\"pg_catalog\".\"uuid\"")
        );
        assert_eq!(
            text_cast("USER-DEFINED", "public", "employment_type").as_deref(),
            Some("\"public\".\"employment_type\"")
        );
        assert_eq!(text_cast("character varying", "pg_catalog", "varchar"), None);
        assert_eq!(text_cast("text", "pg_catalog", "text"), None);
        assert_eq!(text_cast("integer", "pg_catalog", "int4"), None);
    }
}
