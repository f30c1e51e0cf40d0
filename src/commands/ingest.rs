use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::docs::ingest::{self as doc_ingest, IngestMeta};
use crate::state::AppState;

/// Ingest a document from a URL or a local file into the catalog
pub async fn ingest(
    state: &AppState,
    target: &str,
    citation: Option<String>,
    year: Option<u16>,
) -> Result<()> {
    info!(target, citation = citation.as_deref().unwrap_or(""), "Ingestion started");

    let store = &state.store;
    let meta = IngestMeta { citation, year };
    let is_url = target.starts_with("http://") || target.starts_with("https://");

    let (doc_id, size) = if is_url {
        doc_ingest::ingest_url(store, target, meta).await?
    } else {
        doc_ingest::ingest_file(store, state.extractor.as_ref(), Path::new(target), meta).await?
    };

    let name = store
        .get_meta(&doc_id)
        .await?
        .map(|m| m.name)
        .unwrap_or_else(|| target.to_string());

    println!("Ingested {} ({} chars)\nDoc ID: {}", name, size, doc_id);

    // Parameters citing this URL can now resolve straight to the record.
    if is_url {
        let linked = state.registry.citations_by_url(target).await?;
        for (parameter_id, citation) in &linked {
            state
                .registry
                .link_citation(parameter_id, &citation.id, &doc_id)
                .await?;
        }
        if !linked.is_empty() {
            println!("Linked {} citation(s) to the new document", linked.len());
        }
    }

    Ok(())
}
