use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::types::Extraction;

/// The text-extraction collaborator. OCR and PDF parsing live behind it; the
/// engine only sees `(text, reliable)`.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Extraction>;
}

/// Minimum share of alphabetic characters among non-whitespace for text to
/// count as selectable rather than OCR noise.
const MIN_ALPHA_RATIO: f64 = 0.3;

pub fn assess_reliability(text: &str) -> bool {
    let mut visible = 0usize;
    let mut alpha = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if c.is_alphabetic() {
            alpha += 1;
        }
    }
    visible > 0 && (alpha as f64 / visible as f64) >= MIN_ALPHA_RATIO
}

/// Reads text formats directly, flattens HTML, and for everything else uses a
/// pre-extracted sidecar `.txt` or an external command.
pub struct FileExtractor {
    /// e.g. `pdftotext -layout {path} -`
    command: Option<String>,
    /// On-disk cache keyed by the blake3 hash of the source bytes.
    cache_dir: Option<PathBuf>,
}

impl FileExtractor {
    pub fn new(command: Option<String>, cache_dir: Option<PathBuf>) -> Self {
        Self { command, cache_dir }
    }

    fn cache_path(&self, hash: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|d| d.join(format!("{}.txt", hash)))
    }

    async fn extract_uncached(&self, path: &Path, bytes: &[u8]) -> Result<String> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "md" | "csv" => Ok(String::from_utf8_lossy(bytes).to_string()),
            "html" | "htm" => Ok(html2text::from_read(bytes, 120)
                .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string())),
            _ => {
                for sidecar in sidecar_candidates(path) {
                    if sidecar.is_file() {
                        debug!(sidecar = %sidecar.display(), "using pre-extracted text");
                        return tokio::fs::read_to_string(&sidecar)
                            .await
                            .with_context(|| format!("Failed to read {}", sidecar.display()));
                    }
                }
                match &self.command {
                    Some(command) => run_command(command, path).await,
                    None => Ok(String::new()),
                }
            }
        }
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let hash = blake3::hash(&bytes).to_hex().to_string();

        if let Some(cached) = self.cache_path(&hash) {
            if let Ok(text) = tokio::fs::read_to_string(&cached).await {
                debug!(path = %path.display(), hash = %hash, "text cache hit");
                return Ok(Extraction {
                    text,
                    reliable: true,
                });
            }
        }

        let text = self.extract_uncached(path, &bytes).await?;
        let reliable = assess_reliability(&text);

        // Only reliable text is cached; a document written once per hash.
        if reliable {
            if let (Some(cached), Some(dir)) = (self.cache_path(&hash), &self.cache_dir) {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    warn!("Failed to create text cache dir: {}", e);
                } else if let Err(e) = tokio::fs::write(&cached, &text).await {
                    warn!("Failed to write text cache entry: {}", e);
                }
            }
        }

        Ok(Extraction { text, reliable })
    }
}

fn sidecar_candidates(path: &Path) -> [PathBuf; 2] {
    let mut appended = path.as_os_str().to_owned();
    appended.push(".txt");
    [PathBuf::from(appended), path.with_extension("txt")]
}

async fn run_command(template: &str, path: &Path) -> Result<String> {
    let path_str = path.to_string_lossy();
    let mut parts = template
        .split_whitespace()
        .map(|p| p.replace("{path}", &path_str));
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty extraction command"))?;
    let output = tokio::process::Command::new(&program)
        .args(parts)
        .output()
        .await
        .with_context(|| format!("Failed to run extractor '{}'", program))?;
    if !output.status.success() {
        anyhow::bail!(
            "extractor '{}' exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
