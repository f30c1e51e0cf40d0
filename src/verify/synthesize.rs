use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::client::VerifierClient;
use super::types::{Classification, DocumentVerdict};
use crate::registry::types::{Parameter, ParameterVerdict, SourceResult};
use crate::state::VerifyConfig;

/// Combines a parameter's per-document verdicts into its final verdict.
pub struct EvidenceSynthesizer {
    client: Arc<VerifierClient>,
    conclusive: u8,
    cap: u8,
    review_threshold: u8,
}

impl EvidenceSynthesizer {
    pub fn new(client: Arc<VerifierClient>, config: &VerifyConfig) -> Self {
        Self {
            client,
            conclusive: config.early_exit_confidence,
            cap: config.synthesis_cap,
            review_threshold: config.review_threshold,
        }
    }

    /// Synthesis runs when two or more sources exist, none confirms the value
    /// conclusively, and at least one found something.
    pub fn should_synthesize(&self, verdicts: &[DocumentVerdict]) -> bool {
        verdicts.len() >= 2
            && !verdicts.iter().any(|v| {
                v.verdict.classification == Classification::Confirmed
                    && v.verdict.confidence >= self.conclusive
            })
            && verdicts
                .iter()
                .any(|v| v.verdict.classification != Classification::NotFound)
    }

    /// Range a synthesized confidence is clamped into.
    pub fn confidence_band(&self, verdicts: &[DocumentVerdict]) -> (u8, u8) {
        let max = verdicts.iter().map(|v| v.verdict.confidence).max().unwrap_or(0);
        let min_partial = verdicts
            .iter()
            .filter(|v| v.verdict.classification != Classification::NotFound)
            .map(|v| v.verdict.confidence)
            .min()
            .unwrap_or(0);
        let upper = max.saturating_add(self.cap).min(100);
        let lower = min_partial.saturating_sub(self.cap).min(upper);
        (lower, upper)
    }

    fn needs_review(
        &self,
        classification: Classification,
        confidence: u8,
        verdicts: &[DocumentVerdict],
    ) -> bool {
        classification == Classification::NotFound
            || confidence < self.review_threshold
            || verdicts
                .iter()
                .any(|v| v.verdict.classification == Classification::Contradicted)
    }

    /// Final verdict for `parameter`. Sources are ordered best first: any
    /// finding ahead of `not_found`, then by confidence.
    pub async fn synthesize(
        &self,
        parameter: &Parameter,
        mut verdicts: Vec<DocumentVerdict>,
    ) -> ParameterVerdict {
        verdicts.sort_by(|a, b| b.verdict.rank().cmp(&a.verdict.rank()));
        let sources: Vec<SourceResult> = verdicts.iter().map(SourceResult::from).collect();
        let mut out = ParameterVerdict {
            parameter_id: parameter.id.clone(),
            parameter_name: parameter.name.clone(),
            claimed_value: parameter.value.clone(),
            classification: Classification::NotFound,
            confidence: 0,
            needs_human_review: true,
            synthesis_used: false,
            documents: verdicts.iter().map(|v| v.document.clone()).collect(),
            strategies: verdicts.iter().map(|v| v.strategy).collect(),
            evidence: String::new(),
            reasoning: String::new(),
            sources,
            verified_at: Utc::now().timestamp(),
        };

        let Some(best) = verdicts.first() else {
            out.reasoning = "no source document could be resolved or read".to_string();
            warn!(parameter = %parameter.id, "no evidence for parameter");
            return out;
        };

        if !self.should_synthesize(&verdicts) {
            out.classification = best.verdict.classification;
            out.confidence = best.verdict.confidence;
            out.evidence = best.verdict.evidence.clone();
            out.reasoning = best.verdict.justification.clone();
            out.needs_human_review =
                self.needs_review(out.classification, out.confidence, &verdicts);
            return out;
        }

        let partial: Vec<DocumentVerdict> = verdicts
            .iter()
            .filter(|v| v.verdict.classification != Classification::NotFound)
            .cloned()
            .collect();

        let combined = self
            .client
            .synthesize(&parameter.name, &parameter.value, &partial)
            .await;
        match combined {
            Ok(combined) => {
                let (lower, upper) = self.confidence_band(&verdicts);
                let confidence = combined.confidence.clamp(lower, upper);
                if confidence != combined.confidence {
                    info!(
                        parameter = %parameter.id,
                        proposed = combined.confidence,
                        clamped = confidence,
                        "synthesized confidence clamped"
                    );
                }
                out.classification = combined.classification;
                out.confidence = confidence;
                out.evidence = if combined.evidence.is_empty() {
                    best.verdict.evidence.clone()
                } else {
                    combined.evidence
                };
                out.reasoning = combined.justification;
                out.synthesis_used = true;
                out.needs_human_review =
                    self.needs_review(out.classification, confidence, &verdicts);
                info!(
                    parameter = %parameter.id,
                    sources = verdicts.len(),
                    classification = %out.classification,
                    confidence,
                    "evidence synthesized"
                );
            }
            Err(e) => {
                warn!(parameter = %parameter.id, "synthesis failed, keeping best source: {}", e);
                out.classification = best.verdict.classification;
                out.confidence = best.verdict.confidence;
                out.evidence = best.verdict.evidence.clone();
                out.reasoning = format!(
                    "{} (synthesis unavailable: {})",
                    best.verdict.justification, e
                );
                out.needs_human_review = true;
            }
        }
        out
    }
}
