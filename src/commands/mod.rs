mod config;
mod export;
mod import;
mod index;
mod ingest;
mod run;
mod sources;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::state::AppState;

use run::RunArgs;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify parameters against their sources
    Run(RunArgs),
    /// Load parameters from a JSON file, or citation URLs from the sources sheet (.csv)
    Import {
        file: PathBuf,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a document to the catalog from a URL or local file
    Ingest {
        /// URL or path
        target: String,
        /// Bibliographic citation used for fuzzy matching
        #[arg(long)]
        citation: Option<String>,
        #[arg(long)]
        year: Option<u16>,
    },
    /// Check the local catalog index and rebuild it when stale
    Index {
        #[arg(long)]
        rebuild: bool,
    },
    /// Write the latest verdicts to a CSV report
    Export {
        file: PathBuf,
    },
    /// Summarise persisted verdicts, or show one parameter's verdict history
    Status {
        parameter: Option<String>,
    },
    /// List catalog documents
    Sources {
        /// Max documents to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show the effective verification settings
    Config,
}

/// Run a command. Returns false when the command completed but its outcome
/// should be reported as a failure exit status.
pub async fn dispatch(state: &AppState, command: Command) -> Result<bool> {
    match command {
        Command::Run(args) => run::run(state, args).await,
        Command::Import { file, dry_run } => {
            import::import(state, &file, dry_run).await.map(|_| true)
        }
        Command::Ingest {
            target,
            citation,
            year,
        } => ingest::ingest(state, &target, citation, year).await.map(|_| true),
        Command::Index { rebuild } => index::index(state, rebuild).map(|_| true),
        Command::Export { file } => export::export(state, &file).await.map(|_| true),
        Command::Status { parameter } => {
            status::status(state, parameter.as_deref()).await.map(|_| true)
        }
        Command::Sources { limit } => sources::sources(state, limit).await.map(|_| true),
        Command::Config => {
            config::config(state);
            Ok(true)
        }
    }
}
