use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use crate::docs::loader::DocumentLoader;
use crate::orchestrator::BatchOrchestrator;
use crate::resolve::catalog::CatalogIndex;
use crate::resolve::SourceResolver;
use crate::state::{AppState, VerifyConfig};
use crate::verify::{ChunkAggregator, EvidenceSynthesizer, VerifierClient};

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Reprocess parameters that already have a verdict
    #[arg(long)]
    pub force: bool,
    /// Send one claim per verifier call instead of batching per document
    #[arg(long)]
    pub single: bool,
    #[arg(long)]
    pub chunk_size: Option<usize>,
    #[arg(long)]
    pub overlap: Option<usize>,
    /// Documents processed concurrently
    #[arg(long)]
    pub workers: Option<usize>,
    /// Only verify these parameter ids
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,
}

impl RunArgs {
    /// Apply flag overrides to the environment configuration.
    pub fn apply(&self, config: &mut VerifyConfig) {
        if let Some(size) = self.chunk_size {
            // The direct-call threshold follows the chunk size unless set apart.
            if config.direct_threshold == config.chunk_size {
                config.direct_threshold = size;
            }
            config.chunk_size = size;
        }
        if let Some(overlap) = self.overlap {
            config.chunk_overlap = overlap;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.single {
            config.batch_mode = false;
        }
    }
}

/// Returns true when every verified parameter resolved to a finding.
pub async fn run(state: &AppState, args: RunArgs) -> Result<bool> {
    let config = &state.config;

    let index = CatalogIndex::load_or_rebuild(&config.index_path(), &state.library)?;
    let resolver = SourceResolver::new(state.library.clone(), state.store.clone(), index);
    let loader = DocumentLoader::new(state.store.clone(), state.extractor.clone());
    let verifier = Arc::new(VerifierClient::new(
        state.llm.clone(),
        config.max_attempts,
        config.call_timeout,
    ));
    let orchestrator = BatchOrchestrator::new(
        Arc::new(resolver),
        Arc::new(loader),
        Arc::new(ChunkAggregator::new(verifier.clone(), config, state.cancel.clone())),
        Arc::new(EvidenceSynthesizer::new(verifier, config)),
        state.registry.clone(),
        config.workers,
        state.cancel.clone(),
    );

    let parameters = if args.only.is_empty() {
        state.registry.parameters().await?
    } else {
        let mut selected = Vec::new();
        for id in &args.only {
            match state.registry.get_parameter(id).await? {
                Some(p) => selected.push(p),
                None => warn!(parameter = %id, "unknown parameter id"),
            }
        }
        selected
    };
    if parameters.is_empty() {
        warn!("no parameters to verify; import some first");
        return Ok(false);
    }

    info!(
        parameters = parameters.len(),
        model = state.llm.model(),
        batch = config.batch_mode,
        chunk_size = config.chunk_size,
        overlap = config.chunk_overlap,
        "run configured"
    );
    let report = orchestrator.run(parameters, args.force).await?;

    for v in &report.verdicts {
        println!(
            "{:<28} {:<12} {:>3}%  {}{}  {}",
            v.parameter_id,
            v.classification.as_str(),
            v.confidence,
            if v.needs_human_review { "R" } else { "-" },
            if v.synthesis_used { "S" } else { "-" },
            v.documents.first().map(String::as_str).unwrap_or("(no source)"),
        );
    }
    let s = &report.summary;
    println!(
        "\n{} parameters: {} resolved, {} need review, {} synthesized, {} resumed",
        s.parameters, s.resolved, s.needs_review, s.synthesized, s.resumed
    );
    println!(
        "{} documents ({} skipped), {} unresolved citations",
        s.documents, s.documents_skipped, s.unresolved_citations
    );
    if s.cancelled > 0 {
        println!("run cancelled: {} parameters left without a verdict", s.cancelled);
    }

    Ok(s.all_resolved())
}
