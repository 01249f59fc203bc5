//! Database access: pool, table bootstrap and catalog queries

pub mod bootstrap;
pub mod catalog;
pub mod pool;

pub use bootstrap::{bootstrap, ensure_tables, BootstrapStatus, DECLARED_TABLES};
pub use catalog::{describe_table, list_tables, row_count, table_summaries, TableSummary};
pub use pool::{DbPool, DbTransaction, PoolStats, PooledConnection};
