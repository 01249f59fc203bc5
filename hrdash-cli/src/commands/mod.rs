//! Command implementations for the hrdash CLI

pub mod ask;
pub mod init;
pub mod logs;
pub mod query;
pub mod report;
pub mod serve;
pub mod tables;
pub mod upload;

use std::path::PathBuf;

use anyhow::{Context, Result};
use hrdash_core::{DbPool, HrConfig};

use crate::ui;

/// Per-invocation context: where the config comes from, and how to get a
/// pool from it. Commands that never touch the database never load either.
pub struct Session {
    config_path: Option<PathBuf>,
}

impl Session {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn config(&self) -> Result<HrConfig> {
        HrConfig::load(self.config_path.as_deref()).context("failed to load configuration")
    }

    pub async fn connect(&self, config: &HrConfig) -> Result<DbPool> {
        let target = config.database.display_target();
        ui::with_spinner_async(
            format!("Connecting to {}", target),
            "Connected",
            DbPool::connect(&config.database),
        )
        .await
        .with_context(|| format!("cannot connect to database {}", target))
    }
}
