use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::scoring::{self, KEY_ACRONYMS, STOPWORDS};
use crate::docs::local::LocalLibrary;

/// Bump when the entry layout or tokenisation changes.
pub const INDEX_VERSION: u32 = 2;

/// Identity metadata for one local document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub file_name: String,
    pub stem: String,
    pub modified: DateTime<Utc>,
    pub year: Option<u16>,
    pub authors: Vec<String>,
    pub keywords: BTreeSet<String>,
}

/// Precomputed index over the local library. Passed explicitly to the
/// resolver; rebuilding is always an explicit call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogIndex {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    pub entries: BTreeMap<String, CatalogEntry>,
}

impl CatalogIndex {
    pub fn build(library: &LocalLibrary) -> Result<Self> {
        let entries = library
            .files()?
            .into_iter()
            .map(|f| {
                let entry = CatalogEntry {
                    year: scoring::find_year(&f.stem),
                    authors: leading_authors(&f.stem),
                    keywords: scoring::tokenize_stem(&f.stem),
                    file_name: f.file_name.clone(),
                    stem: f.stem,
                    modified: f.modified,
                };
                (f.file_name, entry)
            })
            .collect::<BTreeMap<_, _>>();
        info!(entries = entries.len(), "catalog index built");
        Ok(Self {
            version: INDEX_VERSION,
            built_at: Utc::now(),
            entries,
        })
    }

    /// Load a saved index; `None` when absent or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(index) => Some(index),
            Err(e) => {
                debug!(path = %path.display(), "ignoring unreadable catalog index: {}", e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self).context("serialize catalog index")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Stale when built by another version, older than the newest source file,
    /// or covering a different set of files.
    pub fn is_stale(&self, library: &LocalLibrary) -> Result<bool> {
        if self.version != INDEX_VERSION {
            return Ok(true);
        }
        if let Some(newest) = library.newest_modification()? {
            if newest > self.built_at {
                return Ok(true);
            }
        }
        let files = library.files()?;
        let current: BTreeSet<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        let indexed: BTreeSet<&str> = self.entries.keys().map(|k| k.as_str()).collect();
        Ok(current != indexed)
    }

    pub fn rebuild(&mut self, library: &LocalLibrary) -> Result<()> {
        *self = Self::build(library)?;
        Ok(())
    }

    /// Load from `path`, rebuilding and saving when missing or stale.
    pub fn load_or_rebuild(path: &Path, library: &LocalLibrary) -> Result<Self> {
        match Self::load(path) {
            Some(mut index) => {
                if index.is_stale(library)? {
                    info!("catalog index stale, rebuilding");
                    index.rebuild(library)?;
                    index.save(path)?;
                }
                Ok(index)
            }
            None => {
                let index = Self::build(library)?;
                index.save(path)?;
                Ok(index)
            }
        }
    }

    /// Scoring tokens of an entry: keywords, author names and year.
    pub fn tokens(entry: &CatalogEntry) -> BTreeSet<String> {
        let mut tokens = entry.keywords.clone();
        tokens.extend(entry.authors.iter().map(|a| a.to_lowercase()));
        if let Some(year) = entry.year {
            tokens.insert(year.to_string());
        }
        tokens
    }

    pub fn path_of(&self, library: &LocalLibrary, file_name: &str) -> PathBuf {
        library.root().join(file_name)
    }
}

/// Alphabetic stem tokens before the year, minus stopwords and acronyms.
fn leading_authors(stem: &str) -> Vec<String> {
    let mut authors = Vec::new();
    for part in stem.split(|c: char| c == '_' || c == '-' || c == ' ') {
        if part.chars().any(|c| c.is_ascii_digit()) {
            break;
        }
        let lower = part.to_lowercase();
        let capitalised = part.chars().next().is_some_and(|c| c.is_uppercase());
        let all_caps = part.chars().all(|c| c.is_uppercase());
        if capitalised
            && !all_caps
            && part.chars().count() >= 3
            && !STOPWORDS.contains(&lower.as_str())
            && !KEY_ACRONYMS.contains(&lower.as_str())
        {
            authors.push(part.to_string());
        }
    }
    authors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library_with(files: &[&str]) -> (tempfile::TempDir, LocalLibrary) {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            std::fs::write(dir.path().join(f), "text").unwrap();
        }
        let lib = LocalLibrary::new(dir.path());
        (dir, lib)
    }

    #[test]
    fn test_build_extracts_identity() {
        let (_dir, lib) =
            library_with(&["Muralidharan_Sundararaman_2013_vouchers.txt", "PLFS_2022-23.pdf"]);
        let index = CatalogIndex::build(&lib).unwrap();
        assert_eq!(index.entries.len(), 2);

        let entry = &index.entries["Muralidharan_Sundararaman_2013_vouchers.txt"];
        assert_eq!(entry.year, Some(2013));
        assert_eq!(entry.authors, vec!["Muralidharan", "Sundararaman"]);
        assert!(entry.keywords.contains("vouchers"));

        let plfs = &index.entries["PLFS_2022-23.pdf"];
        assert!(plfs.authors.is_empty());
        assert!(plfs.keywords.contains("plfs"));
    }

    #[test]
    fn test_staleness_on_file_set_change() {
        let (dir, lib) = library_with(&["A_2020.txt"]);
        let index = CatalogIndex::build(&lib).unwrap();
        assert!(!index.is_stale(&lib).unwrap());

        std::fs::write(dir.path().join("B_2021.txt"), "text").unwrap();
        assert!(index.is_stale(&lib).unwrap());
    }

    #[test]
    fn test_staleness_on_version_and_age() {
        let (_dir, lib) = library_with(&["A_2020.txt"]);
        let mut index = CatalogIndex::build(&lib).unwrap();
        index.version = INDEX_VERSION - 1;
        assert!(index.is_stale(&lib).unwrap());

        let mut index = CatalogIndex::build(&lib).unwrap();
        index.built_at = Utc::now() - chrono::Duration::days(365 * 50);
        assert!(index.is_stale(&lib).unwrap());
    }

    #[test]
    fn test_save_load_and_rebuild() {
        let (dir, lib) = library_with(&["A_2020.txt"]);
        let path = dir.path().join("state").join("index.json");
        let index = CatalogIndex::load_or_rebuild(&path, &lib).unwrap();
        assert!(path.exists());

        let loaded = CatalogIndex::load(&path).unwrap();
        assert_eq!(loaded.entries, index.entries);
    }
}
