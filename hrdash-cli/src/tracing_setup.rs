//! Tracing setup for the hrdash CLI
//!
//! Usage:
//!   hrdash --debug ...                    # Debug logging
//!   RUST_LOG=hrdash_core=debug hrdash ... # Fine-grained log control
//!
//! Logs go to stderr so that stdout carries only command output
//! (tables, JSON, CSV) and can be piped.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Tracing configuration options
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Debug level unless RUST_LOG is explicitly set
    pub debug: bool,
    /// Warnings and errors only unless RUST_LOG is explicitly set
    pub quiet: bool,
}

impl TracingConfig {
    fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// return an error that callers may ignore.
pub fn init(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_quiet() {
        let config = TracingConfig {
            debug: true,
            quiet: true,
        };
        assert_eq!(config.default_directive(), "debug");
        assert_eq!(TracingConfig::default().default_directive(), "info");
    }
}
