pub mod extract;
pub mod ingest;
pub mod loader;
pub mod local;
pub mod types;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::resolve::scoring::normalize_url;
use types::{DocId, DocMeta};

// Key prefixes, no trailing slashes (cnidarium convention)
const CONTENT_PREFIX: &str = "doc/content";
const META_PREFIX: &str = "doc/meta";
const URL_PREFIX: &str = "doc/url";

fn content_key(id: &str) -> String {
    format!("{}/{}", CONTENT_PREFIX, id)
}
fn meta_key(id: &str) -> String {
    format!("{}/{}", META_PREFIX, id)
}
fn url_key(url: &str) -> String {
    let digest = blake3::hash(normalize_url(url).as_bytes()).to_hex();
    format!("{}/{}", URL_PREFIX, digest)
}

/// Descriptive fields for a document being added to the catalog.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub name: String,
    pub original_url: Option<String>,
    pub citation: Option<String>,
    pub year: Option<u16>,
    pub local_filename: Option<String>,
}

/// The remote catalog: authoritative document records and their extracted text.
pub struct DocumentStore {
    storage: Storage,
    /// Serialises commits so no delta is built on a stale snapshot.
    write_lock: Mutex<()>,
    /// Cache document text in memory after first read to avoid repeated cnidarium lookups.
    content_cache: RwLock<HashMap<String, String>>,
}

impl DocumentStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![
            CONTENT_PREFIX.to_string(),
            META_PREFIX.to_string(),
            URL_PREFIX.to_string(),
        ];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium catalog storage")?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
            content_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Store a document's extracted text. Returns its content-addressed DocId.
    /// Idempotent: same text = same ID; metadata is replaced.
    pub async fn store(&self, text: &str, doc: NewDocument) -> Result<DocId> {
        let id = blake3::hash(text.as_bytes()).to_hex().to_string();

        let meta = DocMeta {
            id: id.clone(),
            name: doc.name,
            original_url: doc.original_url,
            citation: doc.citation,
            year: doc.year,
            local_filename: doc.local_filename,
            size: text.chars().count(),
            ingested_at: chrono::Utc::now().timestamp(),
        };

        let _guard = self.write_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);

        delta.put_raw(content_key(&id), text.as_bytes().to_vec());
        delta.put_raw(
            meta_key(&id),
            serde_json::to_vec(&meta).context("serialize meta")?,
        );
        if let Some(url) = &meta.original_url {
            delta.put_raw(url_key(url), id.as_bytes().to_vec());
        }

        self.storage.commit(delta).await?;
        debug!(doc_id = %id, name = %meta.name, size = meta.size, "document stored");
        Ok(id)
    }

    pub async fn get_text(&self, doc_id: &str) -> Result<String> {
        // Check cache first
        {
            let cache = self.content_cache.read().await;
            if let Some(text) = cache.get(doc_id) {
                return Ok(text.clone());
            }
        }

        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let content = snapshot
            .get_raw(&content_key(doc_id))
            .await?
            .ok_or_else(|| anyhow::anyhow!("document not found: {}", doc_id))?;
        let text = String::from_utf8_lossy(&content).to_string();

        {
            let mut cache = self.content_cache.write().await;
            cache.insert(doc_id.to_string(), text.clone());
        }

        Ok(text)
    }

    pub async fn get_meta(&self, doc_id: &str) -> Result<Option<DocMeta>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let Some(bytes) = snapshot.get_raw(&meta_key(doc_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes).context("decode doc meta")?))
    }

    /// Look a document up by its original URL (scheme, `www.` and trailing
    /// slash insensitive).
    pub async fn find_by_url(&self, url: &str) -> Result<Option<DocMeta>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let Some(id) = snapshot.get_raw(&url_key(url)).await? else {
            return Ok(None);
        };
        let id = String::from_utf8_lossy(&id).to_string();
        self.get_meta(&id).await
    }

    /// List all catalog records, newest first.
    pub async fn list(&self) -> Result<Vec<DocMeta>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let mut stream = snapshot.prefix_raw(META_PREFIX);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((_key, value)) => match serde_json::from_slice::<DocMeta>(&value) {
                    Ok(meta) => results.push(meta),
                    Err(e) => warn!("Skipping undecodable doc meta: {}", e),
                },
                Err(e) => {
                    warn!("Error reading doc meta stream: {}", e);
                }
            }
        }

        results.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
        Ok(results)
    }
}
