//! Upload pipeline: file → validated rows → one transactional write
//!
//! [`prepare`] is pure: it reconciles the file's header with the target
//! schema, coerces every cell and applies the malformed-row policy.
//! [`Ingestor`] wraps it with file reading, catalog lookup and the write.

pub mod reader;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::dataset::{
    coerce_cell, infer_column_type, normalize_header, Column, ColumnType, Ident, Schema, Value,
};
use crate::db::{catalog, DbPool};
use crate::error::{HrError, Result};

pub use reader::{read_bytes, FileFormat, RawRow, RawSheet};

/// Postgres bind parameter limit per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// How rows are written into an existing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    /// Insert, overwriting non-key columns on primary-key conflict
    Upsert,
    /// Delete every existing row, then insert
    Replace,
}

impl FromStr for WriteMode {
    type Err = HrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "upsert" => Ok(Self::Upsert),
            "replace" => Ok(Self::Replace),
            other => Err(HrError::invalid_parameter(
                "mode",
                format!("'{}' is not one of append, upsert, replace", other),
            )),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Append => "append",
            Self::Upsert => "upsert",
            Self::Replace => "replace",
        })
    }
}

/// What to do with a row that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MalformedPolicy {
    /// Drop the row and record a warning
    #[default]
    #[serde(rename = "skip")]
    Skip,
    /// Abort the upload before anything is written
    #[serde(rename = "fail")]
    FailFast,
}

impl FromStr for MalformedPolicy {
    type Err = HrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fail" | "fail-fast" | "fail_fast" => Ok(Self::FailFast),
            other => Err(HrError::invalid_parameter(
                "on_malformed",
                format!("'{}' is not one of skip, fail", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub mode: WriteMode,
    pub on_malformed: MalformedPolicy,
    pub batch_size: usize,
    /// Worksheet name; the first sheet when `None`
    pub sheet: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            mode: config.mode,
            on_malformed: config.on_malformed,
            batch_size: config.batch_size.max(1),
            sheet: None,
        }
    }
}

/// A row that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowWarning {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Summary returned to the uploader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub rows_read: usize,
    pub rows_written: u64,
    pub created_table: bool,
    pub mode: WriteMode,
    pub warnings: Vec<RowWarning>,
    /// File columns with no counterpart in the table
    pub ignored_columns: Vec<String>,
}

/// Validated rows ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLoad {
    pub table: Ident,
    /// Full target schema (existing or inferred)
    pub schema: Schema,
    /// Target columns present in the file, in insert order
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Table does not exist yet and must be created from `schema`
    pub create_table: bool,
    pub rows_read: usize,
    pub warnings: Vec<RowWarning>,
    pub ignored_columns: Vec<String>,
}

/// Reconcile `sheet` with the target table and validate every row.
///
/// `existing` is the table's current schema, or `None` when the table is
/// to be created with a schema inferred from the file.
pub fn prepare(
    sheet: RawSheet,
    table: &Ident,
    existing: Option<Schema>,
    options: &IngestOptions,
) -> Result<PreparedLoad> {
    let headers = normalized_headers(&sheet.headers)?;

    let create_table = existing.is_none();
    let schema = match existing {
        Some(schema) => schema,
        None => infer_schema(&headers, &sheet.rows),
    };

    // file column index → target column
    let mut mapping: Vec<(usize, Column)> = Vec::new();
    let mut ignored_columns = Vec::new();
    for (index, (original, name)) in sheet.headers.iter().zip(&headers).enumerate() {
        match schema.column(name.as_str()) {
            Some(column) => mapping.push((index, column.clone())),
            None => ignored_columns.push(original.clone()),
        }
    }

    if mapping.is_empty() {
        return Err(HrError::schema_mismatch(
            table.as_str(),
            "none of the file's columns exist in the table",
        ));
    }

    let missing: Vec<&str> = schema
        .columns
        .iter()
        .filter(|c| c.is_required() && !mapping.iter().any(|(_, m)| m.name == c.name))
        .map(|c| c.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(HrError::schema_mismatch(
            table.as_str(),
            format!("file is missing required column(s): {}", missing.join(", ")),
        ));
    }

    if options.mode == WriteMode::Upsert {
        if schema.primary_key.is_empty() {
            return Err(HrError::schema_mismatch(
                table.as_str(),
                "upsert needs a primary key and the table has none",
            ));
        }
        let absent: Vec<&str> = schema
            .primary_key
            .iter()
            .filter(|k| !mapping.iter().any(|(_, m)| &m.name == *k))
            .map(Ident::as_str)
            .collect();
        if !absent.is_empty() {
            return Err(HrError::schema_mismatch(
                table.as_str(),
                format!("upsert needs key column(s) in the file: {}", absent.join(", ")),
            ));
        }
    }

    let rows_read = sheet.rows.len() + sheet.unreadable.len();
    let mut warnings = Vec::new();
    for unreadable in sheet.unreadable {
        reject(options.on_malformed, &mut warnings, unreadable.line, unreadable.reason)?;
    }

    let width = headers.len();
    let mut rows: Vec<(usize, Vec<Value>)> = Vec::with_capacity(sheet.rows.len());

    for raw in &sheet.rows {
        if raw.cells.len() != width {
            let reason = format!("expected {} fields, found {}", width, raw.cells.len());
            reject(options.on_malformed, &mut warnings, raw.line, reason)?;
            continue;
        }
        match convert_row(raw, &mapping) {
            Ok(values) => rows.push((raw.line, values)),
            Err(reason) => reject(options.on_malformed, &mut warnings, raw.line, reason)?,
        }
    }

    if options.mode == WriteMode::Upsert {
        rows = collapse_duplicate_keys(rows, &mapping, &schema, &mut warnings);
    }

    Ok(PreparedLoad {
        table: table.clone(),
        schema,
        columns: mapping.into_iter().map(|(_, c)| c).collect(),
        rows: rows.into_iter().map(|(_, values)| values).collect(),
        create_table,
        rows_read,
        warnings,
        ignored_columns,
    })
}

fn normalized_headers(headers: &[String]) -> Result<Vec<Ident>> {
    if headers.is_empty() {
        return Err(HrError::malformed_file("file has no header row"));
    }

    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut idents = Vec::with_capacity(headers.len());
    for (index, header) in headers.iter().enumerate() {
        let name = normalize_header(header);
        if name.is_empty() {
            return Err(HrError::malformed_file(format!(
                "column {} has an empty or unusable header '{}'",
                index + 1,
                header
            )));
        }
        if let Some(first) = seen.insert(name.clone(), header) {
            return Err(HrError::malformed_file(format!(
                "headers '{}' and '{}' both map to column '{}'",
                first, header, name
            )));
        }
        idents.push(Ident::new(&name)?);
    }
    Ok(idents)
}

/// Nullable columns, no key, types inferred from every non-empty cell
fn infer_schema(headers: &[Ident], rows: &[RawRow]) -> Schema {
    let columns = headers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let ty = infer_column_type(rows.iter().filter_map(|r| r.cells.get(index)));
            Column::new(name.clone(), ty)
        })
        .collect();
    Schema::new(columns)
}

fn convert_row(raw: &RawRow, mapping: &[(usize, Column)]) -> std::result::Result<Vec<Value>, String> {
    let mut values = Vec::with_capacity(mapping.len());
    for (index, column) in mapping {
        let value = coerce_cell(&raw.cells[*index], column.ty)
            .map_err(|reason| format!("column '{}': {}", column.name, reason))?;
        if value.is_null() && column.is_required() {
            return Err(format!("missing value for required column '{}'", column.name));
        }
        values.push(value);
    }
    Ok(values)
}

fn reject(
    policy: MalformedPolicy,
    warnings: &mut Vec<RowWarning>,
    line: usize,
    reason: String,
) -> Result<()> {
    match policy {
        MalformedPolicy::FailFast => Err(HrError::malformed_row(line, reason)),
        MalformedPolicy::Skip => {
            warnings.push(RowWarning { line, reason });
            Ok(())
        }
    }
}

/// Keep the last occurrence of each primary key. Rows with a NULL key
/// part are all kept.
fn collapse_duplicate_keys(
    rows: Vec<(usize, Vec<Value>)>,
    mapping: &[(usize, Column)],
    schema: &Schema,
    warnings: &mut Vec<RowWarning>,
) -> Vec<(usize, Vec<Value>)> {
    let key_positions: Vec<usize> = mapping
        .iter()
        .enumerate()
        .filter(|(_, (_, column))| schema.is_key(column.name.as_str()))
        .map(|(position, _)| position)
        .collect();

    let mut slot_by_key: HashMap<Vec<String>, usize> = HashMap::new();
    let mut kept: Vec<Option<(usize, Vec<Value>)>> = Vec::with_capacity(rows.len());

    for (line, values) in rows {
        // A NULL key takes the column default (a sequence, say) and never
        // matches another row
        if key_positions.iter().any(|&p| values[p].is_null()) {
            kept.push(Some((line, values)));
            continue;
        }
        let key: Vec<String> = key_positions.iter().map(|&p| values[p].to_string()).collect();
        if let Some(&slot) = slot_by_key.get(&key) {
            if let Some((earlier, _)) = kept[slot].take() {
                warnings.push(RowWarning {
                    line: earlier,
                    reason: format!(
                        "duplicate key ({}) also on line {}; keeping the later row",
                        key.join(", "),
                        line
                    ),
                });
            }
        }
        slot_by_key.insert(key, kept.len());
        kept.push(Some((line, values)));
    }

    kept.into_iter().flatten().collect()
}

/// Rows per INSERT so that rows × columns stays within the bind limit
fn rows_per_batch(batch_size: usize, columns: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / columns.max(1);
    batch_size.min(by_params).max(1)
}

fn insert_builder<'a>(
    load: &PreparedLoad,
    chunk: &'a [Vec<Value>],
    mode: WriteMode,
) -> QueryBuilder<'a, Postgres> {
    let names: Vec<String> = load.columns.iter().map(|c| c.name.quoted()).collect();
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} ({}) ",
        load.table.quoted(),
        names.join(", ")
    ));

    let columns = &load.columns;
    builder.push_values(chunk, |mut tuple, row| {
        for (column, value) in columns.iter().zip(row) {
            if value.is_null() && column.has_default {
                tuple.push("DEFAULT");
                continue;
            }
            if let Some(pg_type) = &column.cast_to {
                tuple.push("CAST(");
                match value {
                    Value::Null => tuple.push_bind_unseparated(None::<String>),
                    other => tuple.push_bind_unseparated(other.to_string()),
                };
                tuple.push_unseparated(format!(" AS {})", pg_type));
                continue;
            }
            match value {
                Value::Null => match column.ty {
                    ColumnType::Integer => tuple.push_bind(None::<i64>),
                    ColumnType::Float => tuple.push_bind(None::<f64>),
                    ColumnType::Decimal => {
                        tuple.push_bind(None::<rust_decimal::Decimal>)
                    }
                    ColumnType::Text => tuple.push_bind(None::<String>),
                    ColumnType::Boolean => tuple.push_bind(None::<bool>),
                    ColumnType::Date => {
                        tuple.push_bind(None::<chrono::NaiveDate>)
                    }
                    ColumnType::Timestamp => {
                        tuple.push_bind(None::<chrono::NaiveDateTime>)
                    }
                },
                Value::Int(v) => tuple.push_bind(*v),
                Value::Float(v) => tuple.push_bind(*v),
                Value::Decimal(v) => tuple.push_bind(*v),
                Value::Text(v) => tuple.push_bind(v.clone()),
                Value::Bool(v) => tuple.push_bind(*v),
                Value::Date(v) => tuple.push_bind(*v),
                Value::Timestamp(v) => tuple.push_bind(*v),
            };
        }
    });

    if mode == WriteMode::Upsert {
        let key: Vec<String> = load.schema.primary_key.iter().map(Ident::quoted).collect();
        let updates: Vec<String> = load
            .columns
            .iter()
            .filter(|c| !load.schema.is_key(c.name.as_str()))
            .map(|c| format!("{0} = EXCLUDED.{0}", c.name.quoted()))
            .collect();
        builder.push(format!(" ON CONFLICT ({}) ", key.join(", ")));
        if updates.is_empty() {
            builder.push("DO NOTHING");
        } else {
            builder.push(format!("DO UPDATE SET {}", updates.join(", ")));
        }
    }

    builder
}

/// Write a prepared load in a single transaction.
///
/// Table creation, the `replace` delete and every insert batch commit
/// together; any error rolls all of them back.
pub async fn write(pool: &DbPool, load: &PreparedLoad, options: &IngestOptions) -> Result<u64> {
    let mut tx = pool.begin().await?;

    if load.create_table {
        let ddl = load.schema.create_table_sql(&load.table);
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(HrError::from_query)?;
        info!(table = %load.table, columns = load.schema.columns.len(), "created table from upload");
    }

    if options.mode == WriteMode::Replace && !load.create_table {
        let deleted = sqlx::query(&format!("DELETE FROM {}", load.table.quoted()))
            .execute(&mut *tx)
            .await
            .map_err(HrError::from_query)?
            .rows_affected();
        info!(table = %load.table, deleted, "cleared table for replace");
    }

    let per_batch = rows_per_batch(options.batch_size, load.columns.len());
    let mut written = 0u64;
    for chunk in load.rows.chunks(per_batch) {
        let mut builder = insert_builder(load, chunk, options.mode);
        written += builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(HrError::from_query)?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Reads uploads and writes them through a pool
pub struct Ingestor<'a> {
    pool: &'a DbPool,
    options: IngestOptions,
}

impl<'a> Ingestor<'a> {
    pub fn new(pool: &'a DbPool, options: IngestOptions) -> Self {
        Self { pool, options }
    }

    pub async fn ingest_bytes(
        &self,
        bytes: Vec<u8>,
        format: FileFormat,
        table: &str,
    ) -> Result<IngestReport> {
        let table = Ident::new(table)?;
        let sheet_name = self.options.sheet.clone();

        // Workbook parsing is CPU-bound
        let sheet = tokio::task::spawn_blocking(move || {
            read_bytes(bytes, format, sheet_name.as_deref())
        })
        .await
        .map_err(|e| HrError::malformed_file(format!("reader task failed: {}", e)))??;

        let existing = catalog::describe_table(self.pool, &table).await?;
        let load = prepare(sheet, &table, existing, &self.options)?;

        for warning in &load.warnings {
            warn!(table = %table, line = warning.line, reason = %warning.reason, "row skipped");
        }

        let rows_written = write(self.pool, &load, &self.options).await?;

        info!(
            table = %table,
            mode = %self.options.mode,
            rows_read = load.rows_read,
            rows_written,
            skipped = load.warnings.len(),
            "upload committed"
        );

        Ok(IngestReport {
            table: table.to_string(),
            rows_read: load.rows_read,
            rows_written,
            created_table: load.create_table,
            mode: self.options.mode,
            warnings: load.warnings,
            ignored_columns: load.ignored_columns,
        })
    }
}
