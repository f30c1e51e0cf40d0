use std::fmt;

use serde::{Deserialize, Serialize};

use crate::docs::types::ResolutionStrategy;

/// Outcome of checking a claim against some text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Confirmed,
    Approximate,
    Contradicted,
    NotFound,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Confirmed,
        Classification::Approximate,
        Classification::Contradicted,
        Classification::NotFound,
    ];

    /// Lenient parse of oracle output. Anything outside the enumeration is `NotFound`.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "confirmed" | "exact" | "exact_match" | "verified" => Self::Confirmed,
            "approximate" | "approximate_match" | "partial" => Self::Approximate,
            "contradicted" | "contradiction" | "mismatch" => Self::Contradicted,
            _ => Self::NotFound,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Approximate => "approximate",
            Self::Contradicted => "contradicted",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The oracle's judgement of one claim against one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkVerdict {
    pub classification: Classification,
    pub confidence: u8,
    pub evidence: String,
    pub justification: String,
}

impl ChunkVerdict {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            classification: Classification::NotFound,
            confidence: 0,
            evidence: String::new(),
            justification: reason.into(),
        }
    }

    /// Ranking used when picking among verdicts: any finding beats every
    /// `not_found`, then confidence decides within each group.
    pub fn rank(&self) -> (bool, u8) {
        (self.classification != Classification::NotFound, self.confidence)
    }
}

/// Best verdict for one claim after scanning one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVerdict {
    pub verdict: ChunkVerdict,
    /// Identifier of the resolved document.
    pub document: String,
    pub strategy: ResolutionStrategy,
    /// Chunk that produced the verdict, `None` when no chunk did.
    pub chunk_index: Option<usize>,
    pub chunks_scanned: usize,
}

/// A parameter value to check against one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub id: String,
    pub parameter: String,
    pub value: String,
    /// Citation text that pointed at the document.
    pub context: String,
    /// How this claim's citation reached the document. Not sent to the oracle.
    pub strategy: ResolutionStrategy,
}

impl Claim {
    pub fn statement(&self) -> String {
        if self.context.is_empty() {
            format!("{} = {}", self.parameter, self.value)
        } else {
            format!("{} = {} (cited as: {})", self.parameter, self.value, self.context)
        }
    }
}
