//! Typed tabular data shared by ingestion, reports and queries.
//!
//! - [`schema`]: identifiers, column types and table schemas
//! - [`coerce`]: raw cell → typed value conversion and type inference
//! - [`table`]: query results and their text/CSV rendering

pub mod coerce;
pub mod schema;
pub mod table;

pub use coerce::{coerce_cell, infer_column_type, RawCell};
pub use schema::{normalize_header, quote_ident, Column, ColumnType, Ident, Schema};
pub use table::{Table, Value};
