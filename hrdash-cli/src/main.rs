//! hrdash CLI - HR reporting dashboard backend
//!
//! - Table bootstrap and catalog (`init`, `tables`)
//! - Spreadsheet ingestion (`upload`)
//! - Predefined reports (`report`)
//! - Guarded read-only SQL (`query`) and the natural-language assistant (`ask`)
//! - Activity log (`logs`) and the JSON API (`serve`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod output;
mod tracing_setup;
mod ui;

use commands::Session;

#[derive(Parser, Debug)]
#[command(
    name = "hrdash",
    author,
    version,
    about = "HR reporting dashboard: spreadsheet uploads, reports and guarded SQL over Postgres",
    long_about = "Load employee, allocation and timesheet spreadsheets into Postgres, run \
                  predefined reports, run read-only SQL, or ask questions in plain language."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress spinners and informational logs (for scripts)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Config file (default: ./hrdash.toml, then ~/.hrdash/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "HRDASH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the HR tables if they do not exist yet
    Init(commands::init::InitArgs),
    /// List tables, or describe one
    Tables(commands::tables::TablesArgs),
    /// Load a CSV, TSV or spreadsheet file into a table
    Upload(commands::upload::UploadArgs),
    /// List or run predefined reports
    Report(commands::report::ReportArgs),
    /// Run a read-only SQL query
    Query(commands::query::QueryArgs),
    /// Ask a question in plain language
    Ask(commands::ask::AskArgs),
    /// Show recent activity
    Logs(commands::logs::LogsArgs),
    /// Run the JSON HTTP API
    Serve(commands::serve::ServeArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        quiet: cli.quiet,
    })
    .ok();
    ui::init_quiet_mode(cli.quiet);
    hrdash_core::load_dotenv();

    let session = Session::new(cli.config);

    match cli.command {
        Commands::Init(args) => commands::init::run(&session, args).await,
        Commands::Tables(args) => commands::tables::run(&session, args).await,
        Commands::Upload(args) => commands::upload::run(&session, args).await,
        Commands::Report(args) => commands::report::run(&session, args).await,
        Commands::Query(args) => commands::query::run(&session, args).await,
        Commands::Ask(args) => commands::ask::run(&session, args).await,
        Commands::Logs(args) => commands::logs::run(&session, args).await,
        Commands::Serve(args) => commands::serve::run(&session, args).await,
        Commands::Completions(args) => run_completions(args),
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_params_parse() {
        let cli = Cli::parse_from([
            "hrdash", "report", "run", "new_joiners", "-p", "from=2024-01-01", "-p",
            "to=2024-03-31", "--output", "csv",
        ]);
        let Commands::Report(args) = cli.command else {
            panic!("expected the report command");
        };
        match args.command {
            commands::report::ReportCommand::Run { name, params, output } => {
                assert_eq!(name, "new_joiners");
                assert_eq!(params[0], ("from".to_string(), "2024-01-01".to_string()));
                assert_eq!(params.len(), 2);
                assert_eq!(output, output::OutputFormat::Csv);
            }
            other => panic!("unexpected report command {other:?}"),
        }
    }
}
