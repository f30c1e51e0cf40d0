mod commands;
mod docs;
mod error;
mod llm;
mod orchestrator;
mod registry;
mod report;
mod resolve;
mod state;
mod verify;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn, Level};

use commands::Command;
use docs::extract::FileExtractor;
use docs::local::LocalLibrary;
use docs::DocumentStore;
use error::PipelineError;
use llm::LlmClient;
use registry::Registry;
use state::{AppState, CancelFlag, VerifyConfig};

/// Verify economic model parameters against their primary sources
#[derive(Debug, Parser)]
#[command(name = "param-evidence", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log per-chunk detail
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let mut config = VerifyConfig::from_env();
    if let Command::Run(args) = &cli.command {
        args.apply(&mut config);
    }
    config.validate()?;

    // Init LLM client
    let llm_client = Arc::new(LlmClient::from_env(config.call_timeout)?);
    let needs_key = llm_client.requires_key() && !llm_client.has_key();
    if matches!(cli.command, Command::Run(_)) && needs_key {
        let reason = "LLM_API_KEY is required for a remote LLM_BASE_URL";
        return Err(PipelineError::Config(reason.into()).into());
    }
    info!(model = llm_client.model(), "LLM client initialized");

    // Init storage
    let store = Arc::new(
        DocumentStore::new(&config.catalog_dir())
            .await
            .map_err(|e| PipelineError::Config(format!("document catalog unavailable: {:#}", e)))?,
    );
    let registry = Arc::new(
        Registry::new(&config.registry_dir())
            .await
            .map_err(|e| PipelineError::Config(format!("registry unavailable: {:#}", e)))?,
    );
    info!("Storage initialized at {:?}", config.data_dir);

    let library = Arc::new(LocalLibrary::new(&config.sources_dir));
    if !library.root().is_dir() {
        warn!(
            dir = %library.root().display(),
            "sources directory does not exist; only catalog documents are available"
        );
    }
    let extractor = Arc::new(FileExtractor::new(
        config.extract_command.clone(),
        Some(config.text_cache_dir()),
    ));

    let cancel = CancelFlag::default();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight chunks");
                cancel.cancel();
            }
        });
    }

    let app_state = AppState {
        config,
        store,
        registry,
        library,
        extractor,
        llm: llm_client,
        cancel,
    };

    match commands::dispatch(&app_state, cli.command)
        .await
        .context("command failed")
    {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            error!("{:#}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
