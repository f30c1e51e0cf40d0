use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Content-addressed document ID (blake3 hex hash).
pub type DocId = String;

/// Catalog record stored alongside the extracted text in cnidarium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub id: DocId,
    pub name: String,
    /// Where the document was fetched from, if anywhere.
    #[serde(default)]
    pub original_url: Option<String>,
    /// Bibliographic citation, used for fuzzy matching.
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    /// File name in the local library when the same document exists there.
    #[serde(default)]
    pub local_filename: Option<String>,
    pub size: usize,
    pub ingested_at: i64,
}

/// One attempt order of the Source Resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LocalExact,
    RemoteById,
    RemoteByUrl,
    LocalFuzzy,
    RemoteFuzzy,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LocalExact => "local_exact",
            ResolutionStrategy::RemoteById => "remote_by_id",
            ResolutionStrategy::RemoteByUrl => "remote_by_url",
            ResolutionStrategy::LocalFuzzy => "local_fuzzy",
            ResolutionStrategy::RemoteFuzzy => "remote_fuzzy",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical identity of a document. Two citations resolving to the same
/// location share one `ResolvedDocument` within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocLocation {
    Local(PathBuf),
    Remote(DocId),
}

impl fmt::Display for DocLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocLocation::Local(path) => write!(f, "local:{}", path.display()),
            DocLocation::Remote(id) => write!(f, "remote:{}", id),
        }
    }
}

/// A document located for a citation. Text is loaded lazily, once per run.
#[derive(Debug)]
pub struct ResolvedDocument {
    pub location: DocLocation,
    pub name: String,
    pub(crate) text: OnceCell<std::sync::Arc<str>>,
}

impl ResolvedDocument {
    pub fn new(location: DocLocation, name: String) -> Self {
        Self {
            location,
            name,
            text: OnceCell::new(),
        }
    }

    /// Stable identifier written to reports.
    pub fn identifier(&self) -> String {
        match &self.location {
            DocLocation::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            DocLocation::Remote(id) => id.clone(),
        }
    }

    /// Size in characters, once the text has been loaded.
    pub fn char_len(&self) -> Option<usize> {
        self.text.get().map(|t| t.chars().count())
    }
}

/// Output of the text-extraction collaborator.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    /// False when the text likely needs an image-recognition pass.
    pub reliable: bool,
}
