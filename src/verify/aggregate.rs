use std::sync::Arc;

use tracing::{debug, info, warn};

use super::chunker;
use super::client::VerifierClient;
use super::types::{ChunkVerdict, Claim, Classification, DocumentVerdict};
use crate::docs::types::ResolvedDocument;
use crate::state::{CancelFlag, VerifyConfig};

/// Scans one document's chunks for a set of claims.
pub struct ChunkAggregator {
    client: Arc<VerifierClient>,
    chunk_size: usize,
    overlap: usize,
    direct_threshold: usize,
    early_exit: u8,
    batch_mode: bool,
    cancel: CancelFlag,
}

struct ClaimProgress {
    best: Option<(ChunkVerdict, usize)>,
    scanned: usize,
    pending: bool,
}

impl ChunkAggregator {
    pub fn new(client: Arc<VerifierClient>, config: &VerifyConfig, cancel: CancelFlag) -> Self {
        Self {
            client,
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
            direct_threshold: config.direct_threshold,
            early_exit: config.early_exit_confidence,
            batch_mode: config.batch_mode,
            cancel,
        }
    }

    /// Best verdict per claim, in the order given.
    ///
    /// A claim leaves the pending set once a chunk returns a finding at or
    /// above the early-exit confidence; scanning stops when nothing is
    /// pending. The verdict kept for each claim is the best one seen by
    /// [`ChunkVerdict::rank`], whichever chunk produced it, so a finding in a
    /// later chunk outranks an earlier confident `not_found`.
    pub async fn aggregate(
        &self,
        claims: &[Claim],
        document: &ResolvedDocument,
        text: &str,
    ) -> Vec<DocumentVerdict> {
        let name = document.name.as_str();
        let char_len = document.char_len().unwrap_or_else(|| text.chars().count());
        let (size, overlap) = if char_len <= self.direct_threshold {
            (char_len.max(1), 0)
        } else {
            (self.chunk_size, self.overlap)
        };

        let mut progress: Vec<ClaimProgress> = claims
            .iter()
            .map(|_| ClaimProgress {
                best: None,
                scanned: 0,
                pending: true,
            })
            .collect();
        let mut chunks_read = 0usize;

        for chunk in chunker::chunk(text, size, overlap) {
            if self.cancel.is_cancelled() {
                warn!(
                    document = name,
                    chunk = chunk.index,
                    "run cancelled, stopping document scan"
                );
                break;
            }
            let pending: Vec<usize> = (0..claims.len()).filter(|&i| progress[i].pending).collect();
            if pending.is_empty() {
                break;
            }
            chunks_read += 1;
            debug!(
                document = name,
                chunk = chunk.index,
                start = chunk.start,
                end = chunk.end,
                claims = pending.len(),
                "verifying chunk"
            );

            let verdicts = if self.batch_mode {
                let batch: Vec<&Claim> = pending.iter().map(|&i| &claims[i]).collect();
                self.client.verify_batch(&batch, name, chunk.text).await
            } else {
                let mut out = Vec::with_capacity(pending.len());
                for &i in &pending {
                    out.push(self.client.verify_one(&claims[i], name, chunk.text).await);
                }
                out
            };

            for (&i, verdict) in pending.iter().zip(verdicts) {
                let entry = &mut progress[i];
                entry.scanned += 1;
                if verdict.classification != Classification::NotFound
                    && verdict.confidence >= self.early_exit
                {
                    debug!(
                        document = name,
                        claim = %claims[i].id,
                        chunk = chunk.index,
                        "early exit"
                    );
                    entry.pending = false;
                }
                let better = match &entry.best {
                    Some((current, _)) => verdict.rank() > current.rank(),
                    None => true,
                };
                if better {
                    entry.best = Some((verdict, chunk.index));
                }
            }
        }

        info!(
            document = name,
            chunks = chunks_read,
            claims = claims.len(),
            "document scanned"
        );

        progress
            .into_iter()
            .zip(claims)
            .map(|(p, claim)| {
                let (verdict, chunk_index) = match p.best {
                    Some((verdict, index)) => (verdict, Some(index)),
                    None => (ChunkVerdict::not_found("document was not scanned"), None),
                };
                DocumentVerdict {
                    verdict,
                    document: document.identifier(),
                    strategy: claim.strategy,
                    chunk_index,
                    chunks_scanned: p.scanned,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::docs::types::{DocLocation, ResolutionStrategy};
    use crate::verify::client::tests::{client, ScriptedOracle};

    impl ChunkAggregator {
        async fn aggregate_one(
            &self,
            claim: &Claim,
            document: &ResolvedDocument,
            text: &str,
        ) -> DocumentVerdict {
            let mut verdicts = self.aggregate(std::slice::from_ref(claim), document, text).await;
            verdicts.swap_remove(0)
        }
    }

    fn config(batch_mode: bool) -> VerifyConfig {
        VerifyConfig {
            chunk_size: 100,
            chunk_overlap: 10,
            direct_threshold: 100,
            batch_mode,
            ..VerifyConfig::default()
        }
    }

    fn claim(id: &str) -> Claim {
        Claim {
            id: id.into(),
            parameter: id.into(),
            value: "1".into(),
            context: String::new(),
            strategy: ResolutionStrategy::RemoteById,
        }
    }

    fn doc() -> ResolvedDocument {
        ResolvedDocument::new(DocLocation::Remote("d1".into()), "report".into())
    }

    fn aggregator(oracle: Arc<ScriptedOracle>, batch_mode: bool) -> ChunkAggregator {
        let client = Arc::new(client(oracle));
        ChunkAggregator::new(client, &config(batch_mode), CancelFlag::default())
    }

    #[tokio::test]
    async fn test_early_exit_drops_confident_claim() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(r#"{"results": [
                {"claim_id": "A", "classification": "confirmed", "confidence": 90},
                {"claim_id": "B", "classification": "not_found", "confidence": 10}]}"#),
            Ok(r#"{"results": [{"claim_id": "B", "classification": "approximate", "confidence": 50}]}"#),
            Ok(r#"{"results": [{"claim_id": "B", "classification": "approximate", "confidence": 40}]}"#),
        ]));
        let agg = aggregator(oracle.clone(), true);
        let text = "x".repeat(250);
        let out = agg.aggregate(&[claim("A"), claim("B")], &doc(), &text).await;

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("claim_id: A"));
        assert!(prompts[1..].iter().all(|p| !p.contains("claim_id: A")));

        assert_eq!(out[0].verdict.confidence, 90);
        assert_eq!(out[0].chunk_index, Some(0));
        assert_eq!(out[0].chunks_scanned, 1);
        // Best across chunks, not the last one.
        assert_eq!(out[1].verdict.confidence, 50);
        assert_eq!(out[1].chunk_index, Some(1));
        assert_eq!(out[1].chunks_scanned, 3);
    }

    #[tokio::test]
    async fn test_stops_when_nothing_pending() {
        let oracle = Arc::new(ScriptedOracle::always(
            r#"{"classification": "confirmed", "confidence": 95}"#,
        ));
        let agg = aggregator(oracle.clone(), false);
        let text = "x".repeat(1_000);
        let out = agg.aggregate_one(&claim("A"), &doc(), &text).await;
        assert_eq!(oracle.calls(), 1);
        assert_eq!(out.chunks_scanned, 1);
        assert_eq!(out.strategy, ResolutionStrategy::RemoteById);
        assert_eq!(out.document, "d1");
    }

    #[tokio::test]
    async fn test_confident_not_found_keeps_scanning() {
        let oracle = Arc::new(ScriptedOracle::always(
            r#"{"classification": "not_found", "confidence": 95}"#,
        ));
        let agg = aggregator(oracle.clone(), false);
        let text = "x".repeat(250);
        let out = agg.aggregate_one(&claim("A"), &doc(), &text).await;
        assert_eq!(oracle.calls(), 3);
        assert_eq!(out.verdict.classification, Classification::NotFound);
    }

    #[tokio::test]
    async fn test_late_finding_beats_early_confident_not_found() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(r#"{"classification": "not_found", "confidence": 95}"#),
            Ok(r#"{"classification": "not_found", "confidence": 95}"#),
            Ok(r#"{"classification": "approximate", "confidence": 70, "evidence": "roughly 1"}"#),
        ]));
        let agg = aggregator(oracle.clone(), false);
        let text = "x".repeat(250);
        let out = agg.aggregate_one(&claim("A"), &doc(), &text).await;
        assert_eq!(oracle.calls(), 3);
        assert_eq!(out.verdict.classification, Classification::Approximate);
        assert_eq!(out.verdict.confidence, 70);
        assert_eq!(out.verdict.evidence, "roughly 1");
        assert_eq!(out.chunk_index, Some(2));
        assert_eq!(out.chunks_scanned, 3);
    }

    #[tokio::test]
    async fn test_strategy_comes_from_each_claim() {
        let oracle = Arc::new(ScriptedOracle::always(
            r#"{"results": [
                {"claim_id": "A", "classification": "confirmed", "confidence": 90},
                {"claim_id": "B", "classification": "confirmed", "confidence": 90}]}"#,
        ));
        let agg = aggregator(oracle, true);
        let local = Claim {
            strategy: ResolutionStrategy::LocalExact,
            ..claim("A")
        };
        let out = agg.aggregate(&[local, claim("B")], &doc(), "short text").await;
        assert_eq!(out[0].strategy, ResolutionStrategy::LocalExact);
        assert_eq!(out[1].strategy, ResolutionStrategy::RemoteById);
    }

    #[tokio::test]
    async fn test_small_document_single_direct_call() {
        let oracle = Arc::new(ScriptedOracle::always(
            r#"{"results": [
                {"claim_id": "A", "classification": "approximate", "confidence": 60},
                {"claim_id": "B", "classification": "approximate", "confidence": 70}]}"#,
        ));
        let agg = aggregator(oracle.clone(), true);
        let out = agg.aggregate(&[claim("A"), claim("B")], &doc(), "short text").await;
        assert_eq!(oracle.calls(), 1);
        assert_eq!(out[1].verdict.confidence, 70);
    }

    #[tokio::test]
    async fn test_cancelled_before_scan() {
        let oracle = Arc::new(ScriptedOracle::always(
            r#"{"classification": "confirmed", "confidence": 95}"#,
        ));
        let cancel = CancelFlag::default();
        cancel.cancel();
        let agg = ChunkAggregator::new(
            Arc::new(VerifierClient::new(oracle.clone(), 1, Duration::from_secs(1))),
            &config(false),
            cancel,
        );
        let out = agg.aggregate_one(&claim("A"), &doc(), "text").await;
        assert_eq!(oracle.calls(), 0);
        assert_eq!(out.chunks_scanned, 0);
        assert_eq!(out.chunk_index, None);
    }
}
