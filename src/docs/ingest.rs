use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use super::extract::TextExtractor;
use super::types::DocId;
use super::{DocumentStore, NewDocument};

/// Descriptive metadata supplied alongside an ingested document.
#[derive(Debug, Clone, Default)]
pub struct IngestMeta {
    pub citation: Option<String>,
    pub year: Option<u16>,
}

/// Fetch a web page or text document into the catalog.
/// Returns (doc_id, size in characters).
pub async fn ingest_url(
    store: &DocumentStore,
    url: &str,
    meta: IngestMeta,
) -> Result<(DocId, usize)> {
    let resp = reqwest::get(url).await.context("Failed to fetch URL")?;
    if !resp.status().is_success() {
        bail!("fetching {} returned {}", url, resp.status());
    }

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type.contains("pdf") {
        bail!("{} is a PDF; download it into the sources directory and ingest the file", url);
    }

    let body = resp.bytes().await.context("Failed to read response body")?;

    // Convert HTML to text if applicable
    let text = if content_type.contains("html") {
        html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
    } else {
        String::from_utf8_lossy(&body).to_string()
    };

    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_string();
    let size = text.chars().count();
    let doc_id = store
        .store(
            &text,
            NewDocument {
                name,
                original_url: Some(url.to_string()),
                citation: meta.citation,
                year: meta.year,
                local_filename: None,
            },
        )
        .await?;

    info!(doc_id = %doc_id, size, "URL ingested");
    Ok((doc_id, size))
}

/// Extract a local file and register it in the catalog, linked to its file name
/// so local and remote routes to it resolve to one document.
pub async fn ingest_file(
    store: &DocumentStore,
    extractor: &dyn TextExtractor,
    path: &Path,
    meta: IngestMeta,
) -> Result<(DocId, usize)> {
    let extraction = extractor.extract(path).await?;
    if !extraction.reliable {
        bail!(
            "{} has no reliable text layer; provide a sidecar .txt or TEXT_EXTRACT_CMD",
            path.display()
        );
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))?;
    let size = extraction.text.chars().count();
    let doc_id = store
        .store(
            &extraction.text,
            NewDocument {
                name: file_name.clone(),
                original_url: None,
                citation: meta.citation,
                year: meta.year,
                local_filename: Some(file_name),
            },
        )
        .await?;

    info!(doc_id = %doc_id, size, path = %path.display(), "file ingested");
    Ok((doc_id, size))
}
