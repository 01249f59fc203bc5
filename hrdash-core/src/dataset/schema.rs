//! Identifiers, column types and table schemas
//!
//! Every table or column name that ends up in generated SQL goes through
//! [`Ident`], and is then double-quoted with [`quote_ident`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HrError, Result};

/// Postgres truncates identifiers beyond 63 bytes
const MAX_IDENT_LEN: usize = 63;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("invalid identifier regex"));

static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("invalid separator regex"));

/// Validated SQL identifier: lowercase ASCII letters, digits and underscores,
/// not starting with a digit, at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    /// Validate a table or column name. Surrounding whitespace is trimmed and
    /// ASCII letters are lower-cased, matching how Postgres folds unquoted names.
    pub fn new(s: &str) -> Result<Self> {
        let candidate = s.trim().to_ascii_lowercase();
        if candidate.is_empty() {
            return Err(HrError::InvalidIdentifier {
                value: s.to_owned(),
                reason: "must not be empty",
            });
        }
        if candidate.len() > MAX_IDENT_LEN {
            return Err(HrError::InvalidIdentifier {
                value: s.to_owned(),
                reason: "must be at most 63 characters",
            });
        }
        if !IDENT_RE.is_match(&candidate) {
            return Err(HrError::InvalidIdentifier {
                value: s.to_owned(),
                reason: "must contain only letters, digits and underscores and not start with a digit",
            });
        }
        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for splicing into SQL
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Turn a spreadsheet header into a column identifier.
///
/// `"Employee ID"` → `employee_id`, `"% Allocation"` → `allocation`,
/// `"2024 Hours"` → `c_2024_hours`. Returns an empty string when nothing
/// usable is left; callers treat that as a file-level error.
pub fn normalize_header(header: &str) -> String {
    let lowered = header.trim_start_matches('\u{feff}').trim().to_lowercase();
    let replaced = NON_ALNUM_RE.replace_all(&lowered, "_");
    let mut name = replaced.trim_matches('_').to_string();

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "c_");
    }
    if name.len() > MAX_IDENT_LEN {
        name.truncate(MAX_IDENT_LEN);
        name = name.trim_end_matches('_').to_string();
    }
    name
}

/// Column types understood by ingestion and result decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    /// DDL type used when creating tables
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Decimal => "NUMERIC",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Map an `information_schema.columns.data_type` value.
    ///
    /// Types without a dedicated variant (uuid, json, arrays, ...) fall back
    /// to `Text`.
    pub fn from_pg_data_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "smallint" | "integer" | "bigint" => Self::Integer,
            "real" | "double precision" => Self::Float,
            "numeric" | "money" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "timestamp without time zone" | "timestamp with time zone" => Self::Timestamp,
            _ => Self::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: Ident,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
    /// Column has a server-side default, so it may be omitted on insert
    pub has_default: bool,
    /// Server type that text binds are cast to, for columns read as text
    /// that Postgres will not assign text to (uuid, jsonb, enums)
    #[serde(skip)]
    pub cast_to: Option<String>,
}

impl Column {
    pub fn new(name: Ident, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            has_default: false,
            cast_to: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn cast_to(mut self, pg_type: impl Into<String>) -> Self {
        self.cast_to = Some(pg_type.into());
        self
    }

    /// Must be supplied by every inserted row
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default
    }
}

/// Ordered column list plus primary key
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub primary_key: Vec<Ident>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            primary_key: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: Vec<Ident>) -> Self {
        self.primary_key = key;
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k.as_str() == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` for a schema that only uses types from
    /// [`ColumnType`]. Tables with server-side defaults are declared as DDL
    /// strings in [`crate::db::bootstrap`] instead.
    pub fn create_table_sql(&self, table: &Ident) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", c.name.quoted(), c.ty.sql_type(), null)
            })
            .collect();

        if !self.primary_key.is_empty() {
            let key: Vec<String> = self.primary_key.iter().map(Ident::quoted).collect();
            parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table.quoted(),
            parts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_identifiers() {
        assert_eq!(Ident::new("employees").unwrap().as_str(), "employees");
        assert_eq!(Ident::new(" Employees ").unwrap().as_str(), "employees");
        assert!(Ident::new("_staging").is_ok());
        assert!(Ident::new("t2024").is_ok());
    }

    #[test]
    fn invalid_identifiers() {
        assert!(Ident::new("").is_err());
        assert!(Ident::new("1table").is_err());
        assert!(Ident::new("drop table x; --").is_err());
        assert!(Ident::new("emp\"loyees").is_err());
        assert!(Ident::new(&"a".repeat(64)).is_err());
    }

    #[test]
    fn quoting_escapes_quotes() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("Employee ID"), "employee_id");
        assert_eq!(normalize_header("  Date of Joining "), "date_of_joining");
        assert_eq!(normalize_header("% Allocation"), "allocation");
        assert_eq!(normalize_header("2024 Hours"), "c_2024_hours");
        assert_eq!(normalize_header("\u{feff}name"), "name");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn pg_type_mapping() {
        assert_eq!(ColumnType::from_pg_data_type("bigint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_pg_data_type("integer"), ColumnType::Integer);
        assert_eq!(
            ColumnType::from_pg_data_type("double precision"),
            ColumnType::Float
        );
        assert_eq!(ColumnType::from_pg_data_type("numeric"), ColumnType::Decimal);
        assert_eq!(
            ColumnType::from_pg_data_type("timestamp with time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(
            ColumnType::from_pg_data_type("character varying"),
            ColumnType::Text
        );
        assert_eq!(ColumnType::from_pg_data_type("uuid"), ColumnType::Text);
    }

    #[test]
    fn create_table_ddl() {
        let table = Ident::new("transactions").unwrap();
        let schema = Schema::new(vec![
            Column::new(Ident::new("name").unwrap(), ColumnType::Text).not_null(),
            Column::new(Ident::new("amount").unwrap(), ColumnType::Float),
        ])
        .with_primary_key(vec![Ident::new("name").unwrap()]);

        assert_eq!(
            schema.create_table_sql(&table),
            "CREATE TABLE IF NOT EXISTS \"transactions\" (\"name\" TEXT NOT NULL, \
             \"amount\" DOUBLE PRECISION, PRIMARY KEY (\"name\"))"
        );
    }

    proptest! {
        #[test]
        fn normalized_headers_are_empty_or_valid(header in "\\PC{0,80}") {
            let name = normalize_header(&header);
            prop_assert!(name.is_empty() || Ident::new(&name).is_ok(), "bad name {:?}", name);
        }
    }
}
