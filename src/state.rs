use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::docs::extract::FileExtractor;
use crate::docs::local::LocalLibrary;
use crate::docs::DocumentStore;
use crate::error::PipelineError;
use crate::llm::LlmClient;
use crate::registry::Registry;

/// Tunable verification policy. Defaults come from the environment, then CLI
/// flags override individual fields.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub sources_dir: PathBuf,
    pub data_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Documents at or below this many characters get one direct call.
    pub direct_threshold: usize,
    /// A claim stops being scanned once a chunk returns at least this confidence.
    pub early_exit_confidence: u8,
    /// Synthesized confidence may exceed the best input by at most this much.
    pub synthesis_cap: u8,
    pub review_threshold: u8,
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub workers: usize,
    pub batch_mode: bool,
    pub extract_command: Option<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            sources_dir: PathBuf::from("./sources"),
            data_dir: PathBuf::from("./data"),
            chunk_size: 50_000,
            chunk_overlap: 10_000,
            direct_threshold: 50_000,
            early_exit_confidence: 85,
            synthesis_cap: 20,
            review_threshold: 70,
            max_attempts: 3,
            call_timeout: Duration::from_secs(300),
            workers: 4,
            batch_mode: true,
            extract_command: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl VerifyConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let chunk_size = env_or("VERIFY_CHUNK_SIZE", d.chunk_size);
        Self {
            sources_dir: dotenv::var("SOURCES_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.sources_dir),
            data_dir: dotenv::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            chunk_size,
            chunk_overlap: env_or("VERIFY_CHUNK_OVERLAP", d.chunk_overlap),
            direct_threshold: env_or("VERIFY_DIRECT_THRESHOLD", chunk_size),
            early_exit_confidence: env_or("VERIFY_EARLY_EXIT", d.early_exit_confidence),
            synthesis_cap: env_or("VERIFY_SYNTHESIS_CAP", d.synthesis_cap),
            review_threshold: env_or("VERIFY_REVIEW_THRESHOLD", d.review_threshold),
            max_attempts: env_or("VERIFY_MAX_ATTEMPTS", d.max_attempts),
            call_timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 300u64)),
            workers: env_or("VERIFY_WORKERS", d.workers),
            batch_mode: d.batch_mode,
            extract_command: dotenv::var("TEXT_EXTRACT_CMD")
                .ok()
                .filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        for (name, value) in [
            ("early exit confidence", self.early_exit_confidence),
            ("synthesis cap", self.synthesis_cap),
            ("review threshold", self.review_threshold),
        ] {
            if value > 100 {
                return Err(PipelineError::Config(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if self.max_attempts == 0 {
            return Err(PipelineError::Config("max attempts must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(PipelineError::Config("worker count must be at least 1".into()));
        }
        Ok(())
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.data_dir.join("registry")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("catalog_index.json")
    }

    pub fn text_cache_dir(&self) -> PathBuf {
        self.data_dir.join("text_cache")
    }
}

/// Run-level cancellation. Set once, never cleared.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AppState {
    pub config: VerifyConfig,
    pub store: Arc<DocumentStore>,
    pub registry: Arc<Registry>,
    pub library: Arc<LocalLibrary>,
    pub extractor: Arc<FileExtractor>,
    pub llm: Arc<LlmClient>,
    pub cancel: CancelFlag,
}
