use serde::{Deserialize, Serialize};

use crate::docs::types::{DocId, ResolutionStrategy};
use crate::verify::types::{Classification, DocumentVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyTier {
    /// Highest uncertainty, largest effect on the estimate.
    Tier1,
    #[default]
    Tier2,
    Tier3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationRole {
    #[default]
    Primary,
    Supplementary,
}

/// One attribution of a parameter to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Catalog id linked by an earlier run.
    #[serde(default)]
    pub document_id: Option<DocId>,
    #[serde(default)]
    pub role: CitationRole,
}

impl SourceCitation {
    /// Citation text, or the URL when the text is empty.
    pub fn search_text(&self) -> &str {
        if self.text.trim().is_empty() {
            self.url.as_deref().unwrap_or("")
        } else {
            &self.text
        }
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> String {
        let text = self.search_text();
        if text.chars().count() > 80 {
            let mut short: String = text.chars().take(77).collect();
            short.push_str("...");
            short
        } else {
            text.to_string()
        }
    }
}

/// A named value used by the economic model, with the sources that back it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    /// Claimed value as written in the model, e.g. `0.72` or `2.25x`.
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default)]
    pub tier: UncertaintyTier,
    #[serde(default)]
    pub citations: Vec<SourceCitation>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Per-source input that fed a parameter verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub document: String,
    pub strategy: ResolutionStrategy,
    pub classification: Classification,
    pub confidence: u8,
    pub chunk_index: Option<usize>,
    pub chunks_scanned: usize,
}

impl From<&DocumentVerdict> for SourceResult {
    fn from(v: &DocumentVerdict) -> Self {
        Self {
            document: v.document.clone(),
            strategy: v.strategy,
            classification: v.verdict.classification,
            confidence: v.verdict.confidence,
            chunk_index: v.chunk_index,
            chunks_scanned: v.chunks_scanned,
        }
    }
}

/// Final, persisted outcome for one parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterVerdict {
    pub parameter_id: String,
    pub parameter_name: String,
    pub claimed_value: String,
    pub classification: Classification,
    pub confidence: u8,
    pub needs_human_review: bool,
    pub synthesis_used: bool,
    /// Documents behind the verdict, best first.
    pub documents: Vec<String>,
    pub strategies: Vec<ResolutionStrategy>,
    pub evidence: String,
    pub reasoning: String,
    pub sources: Vec<SourceResult>,
    pub verified_at: i64,
}

impl ParameterVerdict {
    pub fn evidence_source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_resolved(&self) -> bool {
        self.classification != Classification::NotFound
    }
}
