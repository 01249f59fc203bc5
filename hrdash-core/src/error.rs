/// Structured error types for hrdash-core.
///
/// Library code returns `HrError`; the binaries wrap it in `anyhow` (CLI) or
/// map it onto HTTP responses (server).
use std::io;
use thiserror::Error;

/// Main error type for hrdash-core operations
#[derive(Error, Debug)]
pub enum HrError {
    /// The database could not be reached while building the pool
    #[error("database unreachable: {source}")]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    /// Any other database failure (pool timeout, transaction failure, ...)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// File extension or explicit format is not one we can read
    #[error("unsupported file format '{format}' (expected csv, tsv, xlsx, xls, xlsm or ods)")]
    UnsupportedFormat { format: String },

    /// The uploaded file as a whole cannot be used
    #[error("malformed file: {reason}")]
    MalformedFile { reason: String },

    /// A single row failed validation under the fail-fast policy
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// File columns cannot be reconciled with the target table
    #[error("column mismatch for table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    /// A table or column name is not a safe SQL identifier
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    #[error("unknown report '{name}'")]
    UnknownReport { name: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// SQL refused by the read-only guard; never executed
    #[error("query rejected: {reason}")]
    QueryRejected { reason: String },

    /// SQL reached the database and failed there; carries the raw message
    #[error("query failed: {message}")]
    QueryFailed { message: String },

    /// External text-generation API failure (unavailable, quota, bad body)
    #[error("assistant error: {reason}")]
    Assistant { reason: String },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for hrdash-core operations
pub type Result<T> = std::result::Result<T, HrError>;

impl HrError {
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn malformed_file(reason: impl Into<String>) -> Self {
        Self::MalformedFile {
            reason: reason.into(),
        }
    }

    pub fn malformed_row(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            line,
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::QueryRejected {
            reason: reason.into(),
        }
    }

    pub fn assistant(reason: impl Into<String>) -> Self {
        Self::Assistant {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Wrap a database error raised by user-visible SQL (reports, ad-hoc
    /// queries, assistant output) so the raw server message reaches the user.
    ///
    /// Pool and I/O failures are not the query's fault and stay `Database`.
    pub fn from_query(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::QueryFailed {
                message: db.message().to_string(),
            },
            sqlx::Error::ColumnDecode { index, source } => Self::QueryFailed {
                message: format!("cannot decode column {}: {}", index, source),
            },
            other => Self::Database(other),
        }
    }

    /// Only connectivity failures at startup are fatal; everything else is
    /// surfaced to the caller and the process keeps serving.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HrError::malformed_row(3, "amount: 'abc' is not a number");
        assert_eq!(
            err.to_string(),
            "malformed row at line 3: amount: 'abc' is not a number"
        );

        let err = HrError::schema_mismatch("employees", "missing required column 'full_name'");
        assert!(err.to_string().contains("employees"));
        assert!(err.to_string().contains("full_name"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: HrError = io_err.into();

        assert!(matches!(err, HrError::Io { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn only_connect_is_fatal() {
        let err = HrError::Connect {
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(err.is_fatal());
        assert!(!HrError::Database(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!HrError::rejected("DROP").is_fatal());
    }

    #[test]
    fn pool_errors_are_not_query_failures() {
        let err = HrError::from_query(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, HrError::Database(_)));
    }
}
