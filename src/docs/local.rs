use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Extensions treated as source documents. Sidecar `.txt` files next to a
/// document of another type are extraction output, not documents.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "html", "htm", "csv"];

#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub file_name: String,
    pub stem: String,
    pub modified: DateTime<Utc>,
}

/// Read access to the local source directory.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    root: PathBuf,
}

impl LocalLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All documents in the library, sorted by file name. A missing directory
    /// is an empty library.
    pub fn files(&self) -> Result<Vec<LocalFile>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
                continue;
            };
            if !DOCUMENT_EXTENSIONS.contains(&ext.as_str()) || is_sidecar(&path) {
                continue;
            }
            let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            files.push(LocalFile {
                path,
                file_name,
                stem,
                modified,
            });
        }
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        debug!(root = %self.root.display(), count = files.len(), "local library listed");
        Ok(files)
    }

    /// Exact, case-insensitive match on file stem or full file name.
    pub fn find_exact(&self, key: &str) -> Result<Option<LocalFile>> {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Ok(None);
        }
        Ok(self.files()?.into_iter().find(|f| {
            f.stem.to_lowercase() == key || f.file_name.to_lowercase() == key
        }))
    }

    pub fn find_by_file_name(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.root.join(file_name);
        path.is_file().then_some(path)
    }

    /// Newest modification time across the library.
    pub fn newest_modification(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.files()?.iter().map(|f| f.modified).max())
    }
}

/// `report.pdf.txt` or `report.txt` next to `report.pdf`.
fn is_sidecar(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    if ext != "txt" {
        return false;
    }
    let stem = path.with_extension("");
    if stem.extension().is_some() && stem.is_file() {
        return true;
    }
    ["pdf", "PDF"]
        .iter()
        .any(|e| path.with_extension(e).is_file())
}
