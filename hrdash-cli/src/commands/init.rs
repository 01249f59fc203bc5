//! `hrdash init`: create the HR tables

use anyhow::{bail, Context, Result};
use clap::Parser;
use hrdash_core::db::{bootstrap, DECLARED_TABLES};
use hrdash_core::{BootstrapStatus, HrConfig};

use super::Session;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Print a config file with every default filled in, then exit
    #[arg(long)]
    pub print_config: bool,
}

pub async fn run(session: &Session, args: InitArgs) -> Result<()> {
    if args.print_config {
        print!("{}", config_template()?);
        return Ok(());
    }

    let config = session.config()?;
    let pool = session.connect(&config).await?;

    let status = bootstrap(&pool).await;
    pool.close().await;

    match status {
        BootstrapStatus::Ready => {
            for table in DECLARED_TABLES {
                println!("✓ {}", table.name);
            }
            Ok(())
        }
        BootstrapStatus::Degraded { reason } => bail!("table bootstrap failed: {}", reason),
    }
}

fn config_template() -> Result<String> {
    toml::to_string_pretty(&HrConfig::default()).context("failed to render config template")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_round_trips() {
        let text = config_template().unwrap();
        assert!(text.contains("[database]"));
        assert!(text.contains("employee_management_db"));
        let parsed = HrConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.database.port, 5432);
    }
}
