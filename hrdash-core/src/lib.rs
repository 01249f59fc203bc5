//! hrdash-core: data layer for the HR reporting dashboard
//!
//! Connection pool and table bootstrap, spreadsheet ingestion, predefined
//! reports, guarded ad-hoc SQL, the natural-language query assistant and
//! the activity log.

pub mod activity;
pub mod assistant;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod ingest;
pub mod query;
pub mod reports;

pub use activity::{Action, ActivityEntry, ActivityLog, Outcome};
pub use assistant::{AssistantAnswer, GeminiClient, QueryAssistant, SqlGenerator, SqlGuard};
pub use config::{load_dotenv, HrConfig};
pub use dataset::{Table, Value};
pub use db::{BootstrapStatus, DbPool};
pub use error::{HrError, Result};
pub use ingest::{FileFormat, IngestOptions, IngestReport, Ingestor, MalformedPolicy, WriteMode};
pub use query::{run_read_only, QueryOutcome};
pub use reports::run_report;
