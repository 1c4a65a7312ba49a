use clap::Parser;
use statement_prep::{run_stages, SetupConfig, Stage};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "statement-prep",
    version,
    about = "Builds investor statement aggregates from a general-ledger export"
)]
struct Cli {
    /// Comma separated list of parts to run. Example: 1 or 1,2
    #[arg(long)]
    parts: String,

    /// Setup workbook (JSON)
    #[arg(long)]
    setup: PathBuf,

    /// SQLite database holding the ledger and aggregate tables
    #[arg(long, default_value = "statement_prep.sqlite")]
    db: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = Stage::parse_list(&cli.parts).and_then(|stages| {
        let config = SetupConfig::load(&cli.setup)?;
        run_stages(&stages, &config, &cli.db)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
