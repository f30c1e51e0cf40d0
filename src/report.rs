use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::registry::types::ParameterVerdict;
use crate::verify::types::Classification;

/// One exported row per parameter verdict.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    parameter: &'a str,
    claimed_value: &'a str,
    document: String,
    strategy: String,
    classification: &'static str,
    confidence: u8,
    evidence: &'a str,
    needs_human_review: bool,
    synthesis_used: bool,
    verified_at: String,
}

impl<'a> From<&'a ParameterVerdict> for ReportRow<'a> {
    fn from(v: &'a ParameterVerdict) -> Self {
        Self {
            parameter: &v.parameter_name,
            claimed_value: &v.claimed_value,
            document: v.documents.join("; "),
            strategy: v
                .strategies
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            classification: v.classification.as_str(),
            confidence: v.confidence,
            evidence: &v.evidence,
            needs_human_review: v.needs_human_review,
            synthesis_used: v.synthesis_used,
            verified_at: Utc
                .timestamp_opt(v.verified_at, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

pub fn write_csv<W: Write>(writer: W, verdicts: &[ParameterVerdict]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for verdict in verdicts {
        csv.serialize(ReportRow::from(verdict))
            .with_context(|| format!("Failed to write row for {}", verdict.parameter_id))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, verdicts: &[ParameterVerdict]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(file, verdicts)
}

/// Aggregate counts over persisted verdicts.
#[derive(Debug, Default)]
pub struct StatusSummary {
    pub total: usize,
    pub by_classification: BTreeMap<&'static str, usize>,
    pub needs_review: usize,
    pub synthesized: usize,
    pub average_confidence: f64,
}

impl StatusSummary {
    pub fn from_verdicts(verdicts: &[ParameterVerdict]) -> Self {
        let mut by_classification: BTreeMap<&'static str, usize> =
            Classification::ALL.iter().map(|c| (c.as_str(), 0)).collect();
        for v in verdicts {
            *by_classification.entry(v.classification.as_str()).or_default() += 1;
        }
        let total = verdicts.len();
        let average_confidence = if total == 0 {
            0.0
        } else {
            verdicts.iter().map(|v| v.confidence as f64).sum::<f64>() / total as f64
        };
        Self {
            total,
            by_classification,
            needs_review: verdicts.iter().filter(|v| v.needs_human_review).count(),
            synthesized: verdicts.iter().filter(|v| v.synthesis_used).count(),
            average_confidence,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} parameters verified\n", self.total);
        for (classification, count) in &self.by_classification {
            out.push_str(&format!("  {:<13} {}\n", classification, count));
        }
        out.push_str(&format!("  needs review  {}\n", self.needs_review));
        out.push_str(&format!("  synthesized   {}\n", self.synthesized));
        out.push_str(&format!("  avg confidence {:.1}", self.average_confidence));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::ResolutionStrategy;

    fn verdict(
        id: &str,
        classification: Classification,
        confidence: u8,
        review: bool,
    ) -> ParameterVerdict {
        ParameterVerdict {
            parameter_id: id.to_string(),
            parameter_name: format!("{}, formal share", id),
            claimed_value: "0.72".to_string(),
            classification,
            confidence,
            needs_human_review: review,
            synthesis_used: false,
            documents: vec!["PLFS_2023.pdf".to_string(), "abc123".to_string()],
            strategies: vec![ResolutionStrategy::LocalExact, ResolutionStrategy::RemoteFuzzy],
            evidence: "\"72 percent\" of completers".to_string(),
            reasoning: String::new(),
            sources: vec![],
            verified_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_csv_has_report_columns() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[verdict("P", Classification::Confirmed, 91, false)]).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            concat!(
                "parameter,claimed_value,document,strategy,classification,confidence,",
                "evidence,needs_human_review,synthesis_used,verified_at"
            )
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with(concat!(
            "\"P, formal share\",0.72,PLFS_2023.pdf; abc123,",
            "local_exact; remote_fuzzy,confirmed,91,"
        )));
        assert!(row.contains("2023-11-14T22:13:20+00:00"));
    }

    #[test]
    fn test_status_summary() {
        let summary = StatusSummary::from_verdicts(&[
            verdict("A", Classification::Confirmed, 90, false),
            verdict("B", Classification::NotFound, 0, true),
            verdict("C", Classification::Approximate, 60, true),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_classification["not_found"], 1);
        assert_eq!(summary.by_classification["contradicted"], 0);
        assert_eq!(summary.needs_review, 2);
        assert_eq!(summary.average_confidence, 50.0);
        assert!(summary.render().starts_with("3 parameters verified"));
    }
}
