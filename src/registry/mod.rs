pub mod diff;
pub mod sheet;
pub mod types;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use cnidarium::{StateDelta, StateWrite, Storage};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use diff::ImportDiff;
use types::{Parameter, ParameterVerdict, SourceCitation};

const PARAM_PREFIX: &str = "param";
const VERDICT_PREFIX: &str = "verdict";

fn param_key(id: &str) -> String {
    format!("{}/{}", PARAM_PREFIX, id)
}
fn latest_key(id: &str) -> String {
    format!("{}/latest/{}", VERDICT_PREFIX, id)
}
fn log_key(id: &str, millis: i64, seq: u64) -> String {
    // Zero-padded so prefix scans return history in time order.
    format!("{}/log/{}/{:020}-{:010}", VERDICT_PREFIX, id, millis, seq)
}

/// Backing store for parameters, their citations, and verdicts.
pub struct Registry {
    storage: Storage,
    write_lock: Mutex<()>,
    /// Keeps history keys distinct when saves land in the same millisecond.
    log_seq: AtomicU64,
}

impl Registry {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![PARAM_PREFIX.to_string(), VERDICT_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium registry storage")?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
            log_seq: AtomicU64::new(0),
        })
    }

    async fn put_json<T: serde::Serialize>(&self, entries: Vec<(String, &T)>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        for (key, value) in entries {
            delta.put_raw(key, serde_json::to_vec(value).context("serialize record")?);
        }
        self.storage.commit(delta).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let Some(bytes) = snapshot.get_raw(key).await? else {
            return Ok(None);
        };
        Ok(Some(
            serde_json::from_slice(&bytes).with_context(|| format!("decode {}", key))?,
        ))
    }

    async fn scan_json<T: serde::de::DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let mut stream = snapshot.prefix_raw(prefix);
        let mut results = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => match serde_json::from_slice::<T>(&value) {
                    Ok(record) => results.push(record),
                    Err(e) => warn!(key = %key, "Skipping undecodable record: {}", e),
                },
                Err(e) => warn!("Error reading {} stream: {}", prefix, e),
            }
        }
        Ok(results)
    }

    /// Insert or replace parameters by id.
    pub async fn upsert_parameters(&self, params: &[Parameter]) -> Result<()> {
        let entries = params.iter().map(|p| (param_key(&p.id), p)).collect();
        self.put_json(entries).await?;
        debug!(count = params.len(), "parameters upserted");
        Ok(())
    }

    /// Load parameters from a JSON file (a bare array or `{"parameters": [...]}`)
    /// and upsert the added and changed ones. Citations without an id get
    /// `<param>-<n>`; catalog links already stored are kept. With `dry_run`
    /// nothing is written.
    pub async fn import_file(&self, path: &Path, dry_run: bool) -> Result<ImportDiff> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut incoming = parse_parameters(&bytes)?;
        let existing = self.parameters().await?;
        for param in &mut incoming {
            if let Some(stored) = existing.iter().find(|p| p.id == param.id) {
                diff::keep_links(stored, param);
            }
        }
        let changes = diff::diff(&existing, &incoming);
        if dry_run || changes.is_empty() {
            return Ok(changes);
        }

        let writes: Vec<Parameter> = incoming
            .into_iter()
            .filter(|p| changes.added.contains(&p.id) || changes.changed.contains(&p.id))
            .collect();
        self.upsert_parameters(&writes).await?;
        info!(
            added = changes.added.len(),
            changed = changes.changed.len(),
            path = %path.display(),
            "parameters imported"
        );
        Ok(changes)
    }

    /// Add citation URLs from the parameter-sources sheet to existing
    /// parameters. Rows are matched by parameter id or name; URLs already
    /// cited are skipped. With `dry_run` nothing is written.
    pub async fn import_sheet(&self, path: &Path, dry_run: bool) -> Result<SheetImport> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let rows = sheet::read_rows(file)?;
        let params = self.parameters().await?;

        let mut outcome = SheetImport::default();
        let mut writes = Vec::new();
        for row in &rows {
            let Some(param) = sheet::match_row(row, &params) else {
                warn!(row = %row.name, "sheet row matches no parameter");
                outcome.unmatched.push(row.name.trim().to_string());
                continue;
            };
            outcome.matched += 1;
            let added = sheet::new_citations(row, param);
            if added.is_empty() {
                continue;
            }
            let mut updated = param.clone();
            updated.citations.extend(added.iter().cloned());
            outcome
                .added
                .extend(added.into_iter().map(|c| (param.id.clone(), c)));
            writes.push(updated);
        }

        if !dry_run && !writes.is_empty() {
            self.upsert_parameters(&writes).await?;
            info!(
                parameters = writes.len(),
                citations = outcome.added.len(),
                "sheet citations imported"
            );
        }
        Ok(outcome)
    }

    pub async fn get_parameter(&self, id: &str) -> Result<Option<Parameter>> {
        self.get_json(&param_key(id)).await
    }

    /// All parameters, ordered by id.
    pub async fn parameters(&self) -> Result<Vec<Parameter>> {
        let mut params: Vec<Parameter> = self.scan_json(&format!("{}/", PARAM_PREFIX)).await?;
        params.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(params)
    }

    /// Every citation carrying this URL, with its parameter id.
    pub async fn citations_by_url(&self, url: &str) -> Result<Vec<(String, SourceCitation)>> {
        let wanted = crate::resolve::scoring::normalize_url(url);
        Ok(self
            .parameters()
            .await?
            .into_iter()
            .flat_map(|p| {
                let id = p.id;
                p.citations
                    .into_iter()
                    .filter(|c| {
                        c.url
                            .as_deref()
                            .is_some_and(|u| crate::resolve::scoring::normalize_url(u) == wanted)
                    })
                    .map(move |c| (id.clone(), c))
            })
            .collect())
    }

    /// Record which catalog document a citation resolved to.
    pub async fn link_citation(
        &self,
        parameter_id: &str,
        citation_id: &str,
        doc_id: &str,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let Some(bytes) = snapshot.get_raw(&param_key(parameter_id)).await? else {
            return Ok(false);
        };
        let mut param: Parameter = serde_json::from_slice(&bytes).context("decode parameter")?;
        let Some(citation) = param.citations.iter_mut().find(|c| c.id == citation_id) else {
            return Ok(false);
        };
        if citation.document_id.as_deref() == Some(doc_id) {
            return Ok(false);
        }
        citation.document_id = Some(doc_id.to_string());

        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            param_key(parameter_id),
            serde_json::to_vec(&param).context("serialize parameter")?,
        );
        self.storage.commit(delta).await?;
        debug!(parameter_id, citation_id, doc_id, "citation linked to catalog document");
        Ok(true)
    }

    pub async fn latest_verdict(&self, parameter_id: &str) -> Result<Option<ParameterVerdict>> {
        self.get_json(&latest_key(parameter_id)).await
    }

    /// Replace the latest verdict and append it to the parameter's history.
    pub async fn save_verdict(&self, verdict: &ParameterVerdict) -> Result<()> {
        let seq = self.log_seq.fetch_add(1, Ordering::Relaxed);
        let log = log_key(&verdict.parameter_id, Utc::now().timestamp_millis(), seq);
        self.put_json(vec![(latest_key(&verdict.parameter_id), verdict), (log, verdict)])
            .await?;
        debug!(
            parameter_id = %verdict.parameter_id,
            classification = %verdict.classification,
            confidence = verdict.confidence,
            "verdict persisted"
        );
        Ok(())
    }

    pub async fn latest_verdicts(&self) -> Result<Vec<ParameterVerdict>> {
        let mut verdicts: Vec<ParameterVerdict> =
            self.scan_json(&format!("{}/latest/", VERDICT_PREFIX)).await?;
        verdicts.sort_by(|a, b| a.parameter_id.cmp(&b.parameter_id));
        Ok(verdicts)
    }

    pub async fn verdict_history(&self, parameter_id: &str) -> Result<Vec<ParameterVerdict>> {
        self.scan_json(&format!("{}/log/{}/", VERDICT_PREFIX, parameter_id))
            .await
    }
}

/// Result of a sheet import.
#[derive(Debug, Default)]
pub struct SheetImport {
    pub matched: usize,
    pub unmatched: Vec<String>,
    /// (parameter id, new citation) pairs.
    pub added: Vec<(String, SourceCitation)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<Parameter>),
    Wrapped { parameters: Vec<Parameter> },
}

fn parse_parameters(bytes: &[u8]) -> Result<Vec<Parameter>> {
    let file: ImportFile = serde_json::from_slice(bytes).context("Invalid parameter file")?;
    let mut params = match file {
        ImportFile::List(p) | ImportFile::Wrapped { parameters: p } => p,
    };
    for param in &mut params {
        if param.id.trim().is_empty() {
            anyhow::bail!("parameter {:?} has no id", param.name);
        }
        for (i, citation) in param.citations.iter_mut().enumerate() {
            if citation.id.trim().is_empty() {
                citation.id = format!("{}-{}", param.id, i + 1);
            }
        }
    }
    Ok(params)
}
