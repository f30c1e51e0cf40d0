use thiserror::Error;

/// Failure taxonomy of a verification run.
///
/// Only `Config` is fatal, and only before any parameter is processed. The
/// other variants are recorded against the affected claims and the run moves on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no resolution strategy matched citation '{0}'")]
    ResolutionFailure(String),

    #[error("text extraction failed for {document}: {reason}")]
    ExtractionFailure { document: String, reason: String },

    #[error("verifier call failed after {attempts} attempt(s): {reason}")]
    VerifierTransport { attempts: u32, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}
