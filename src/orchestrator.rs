use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::docs::loader::DocumentLoader;
use crate::docs::types::{DocLocation, ResolutionStrategy, ResolvedDocument};
use crate::registry::types::{Parameter, ParameterVerdict};
use crate::registry::Registry;
use crate::resolve::SourceResolver;
use crate::state::CancelFlag;
use crate::verify::types::{Claim, DocumentVerdict};
use crate::verify::{ChunkAggregator, EvidenceSynthesizer};

/// Every claim against one physical document, across parameters.
struct DocumentJob {
    document: Arc<ResolvedDocument>,
    /// (parameter index, claim) pairs, one per parameter. Each claim carries
    /// the strategy its own citation resolved by.
    claims: Vec<(usize, Claim)>,
}

enum JobOutcome {
    Scanned(Vec<(usize, DocumentVerdict)>),
    Skipped(Vec<usize>),
    Cancelled(Vec<usize>),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub parameters: usize,
    /// Parameters answered from a persisted verdict.
    pub resumed: usize,
    pub verified: usize,
    pub resolved: usize,
    pub needs_review: usize,
    pub synthesized: usize,
    pub documents: usize,
    pub documents_skipped: usize,
    pub unresolved_citations: usize,
    /// Parameters left without a verdict because the run was cancelled.
    pub cancelled: usize,
    pub persist_failures: usize,
}

impl RunSummary {
    /// True when the run finished and every verdict found something.
    pub fn all_resolved(&self) -> bool {
        self.cancelled == 0 && self.persist_failures == 0 && self.resolved == self.parameters
    }
}

pub struct RunReport {
    pub verdicts: Vec<ParameterVerdict>,
    pub summary: RunSummary,
}

/// Drives a verification run: resolve, group by document, scan each
/// document once, then synthesize and persist per parameter.
pub struct BatchOrchestrator {
    resolver: Arc<SourceResolver>,
    loader: Arc<DocumentLoader>,
    aggregator: Arc<ChunkAggregator>,
    synthesizer: Arc<EvidenceSynthesizer>,
    registry: Arc<Registry>,
    workers: usize,
    cancel: CancelFlag,
}

impl BatchOrchestrator {
    pub fn new(
        resolver: Arc<SourceResolver>,
        loader: Arc<DocumentLoader>,
        aggregator: Arc<ChunkAggregator>,
        synthesizer: Arc<EvidenceSynthesizer>,
        registry: Arc<Registry>,
        workers: usize,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            resolver,
            loader,
            aggregator,
            synthesizer,
            registry,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Verify `parameters`. Without `force`, parameters that already hold a
    /// verdict are answered from the registry and not reprocessed.
    pub async fn run(&self, parameters: Vec<Parameter>, force: bool) -> Result<RunReport> {
        let mut summary = RunSummary {
            parameters: parameters.len(),
            ..Default::default()
        };
        let mut verdicts = Vec::with_capacity(parameters.len());

        let mut pending = Vec::new();
        for param in parameters {
            if !force {
                if let Some(existing) = self.registry.latest_verdict(&param.id).await? {
                    summary.resumed += 1;
                    verdicts.push(existing);
                    continue;
                }
            }
            pending.push(param);
        }
        info!(
            pending = pending.len(),
            resumed = summary.resumed,
            force,
            "verification run starting"
        );

        let jobs = self.plan(&pending, &mut summary).await;
        summary.documents = jobs.len();

        let mut remaining = vec![0usize; pending.len()];
        for job in &jobs {
            for (i, _) in &job.claims {
                remaining[*i] += 1;
            }
        }
        let mut collected: Vec<Vec<DocumentVerdict>> = vec![Vec::new(); pending.len()];
        let mut abandoned = vec![false; pending.len()];
        let mut finishing = JoinSet::new();

        // Parameters with no resolvable document are final already.
        for (i, param) in pending.iter().enumerate() {
            if remaining[i] == 0 {
                self.finish(&mut finishing, param.clone(), Vec::new());
            }
        }

        let mut outcomes = stream::iter(jobs)
            .map(|job| self.process(job))
            .buffer_unordered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            let touched: Vec<usize> = match outcome {
                JobOutcome::Scanned(results) => results
                    .into_iter()
                    .map(|(i, verdict)| {
                        collected[i].push(verdict);
                        i
                    })
                    .collect(),
                JobOutcome::Skipped(params) => {
                    summary.documents_skipped += 1;
                    params
                }
                JobOutcome::Cancelled(params) => {
                    for &i in &params {
                        abandoned[i] = true;
                    }
                    params
                }
            };
            for i in touched {
                remaining[i] -= 1;
                if remaining[i] == 0 && !abandoned[i] {
                    let found = std::mem::take(&mut collected[i]);
                    self.finish(&mut finishing, pending[i].clone(), found);
                }
            }
        }
        summary.cancelled = abandoned.iter().filter(|a| **a).count();

        while let Some(joined) = finishing.join_next().await {
            let (verdict, persisted) = joined?;
            summary.verified += 1;
            if !persisted {
                summary.persist_failures += 1;
            }
            verdicts.push(verdict);
        }

        summary.resolved = verdicts.iter().filter(|v| v.is_resolved()).count();
        summary.needs_review = verdicts.iter().filter(|v| v.needs_human_review).count();
        summary.synthesized = verdicts.iter().filter(|v| v.synthesis_used).count();
        verdicts.sort_by(|a, b| a.parameter_id.cmp(&b.parameter_id));

        info!(
            verified = summary.verified,
            resolved = summary.resolved,
            needs_review = summary.needs_review,
            documents = summary.documents,
            cancelled = summary.cancelled,
            "verification run finished"
        );
        Ok(RunReport { verdicts, summary })
    }

    /// Resolve every citation and group claims by physical document.
    async fn plan(&self, params: &[Parameter], summary: &mut RunSummary) -> Vec<DocumentJob> {
        let mut jobs: BTreeMap<DocLocation, DocumentJob> = BTreeMap::new();

        for (i, param) in params.iter().enumerate() {
            for citation in &param.citations {
                let resolution = match self.resolver.resolve(citation).await {
                    Ok(r) => r,
                    Err(e) => {
                        summary.unresolved_citations += 1;
                        warn!(parameter = %param.id, "{}", e);
                        continue;
                    }
                };

                if let Some(remote_id) = &resolution.remote_id {
                    if resolution.strategy != ResolutionStrategy::RemoteById
                        && citation.document_id.as_deref() != Some(remote_id.as_str())
                    {
                        let linked = self
                            .registry
                            .link_citation(&param.id, &citation.id, remote_id)
                            .await;
                        if let Err(e) = linked {
                            warn!(
                                parameter = %param.id,
                                citation = %citation.id,
                                "citation write-back failed: {:#}",
                                e
                            );
                        }
                    }
                }

                let job = jobs
                    .entry(resolution.document.location.clone())
                    .or_insert_with(|| DocumentJob {
                        document: resolution.document.clone(),
                        claims: Vec::new(),
                    });
                if !job.claims.iter().any(|(p, _)| *p == i) {
                    job.claims.push((
                        i,
                        Claim {
                            id: param.id.clone(),
                            parameter: param.name.clone(),
                            value: param.value.clone(),
                            context: citation.search_text().to_string(),
                            strategy: resolution.strategy,
                        },
                    ));
                }
            }
        }

        info!(documents = jobs.len(), "claims grouped by document");
        jobs.into_values().collect()
    }

    async fn process(&self, job: DocumentJob) -> JobOutcome {
        let params = || job.claims.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        if self.cancel.is_cancelled() {
            return JobOutcome::Cancelled(params());
        }

        let text = match self.loader.load(&job.document).await {
            Ok(text) => text,
            // Logged by the loader; the document's claims get no verdict from it.
            Err(_) => return JobOutcome::Skipped(params()),
        };

        let claims: Vec<Claim> = job.claims.iter().map(|(_, c)| c.clone()).collect();
        let results = self.aggregator.aggregate(&claims, &job.document, &text).await;
        if self.cancel.is_cancelled() {
            return JobOutcome::Cancelled(params());
        }
        JobOutcome::Scanned(job.claims.iter().map(|(i, _)| *i).zip(results).collect())
    }

    /// Synthesize and persist one parameter in the background.
    fn finish(
        &self,
        set: &mut JoinSet<(ParameterVerdict, bool)>,
        param: Parameter,
        verdicts: Vec<DocumentVerdict>,
    ) {
        let synthesizer = self.synthesizer.clone();
        let registry = self.registry.clone();
        set.spawn(async move {
            let verdict = synthesizer.synthesize(&param, verdicts).await;
            let persisted = match registry.save_verdict(&verdict).await {
                Ok(()) => true,
                Err(e) => {
                    error!(parameter = %param.id, "failed to persist verdict: {:#}", e);
                    false
                }
            };
            (verdict, persisted)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::loader::tests::CountingExtractor;
    use crate::docs::local::LocalLibrary;
    use crate::docs::{DocumentStore, NewDocument};
    use crate::registry::tests::{citation, parameter};
    use crate::resolve::catalog::CatalogIndex;
    use crate::state::VerifyConfig;
    use crate::verify::client::tests::{client, ScriptedOracle};
    use crate::verify::types::Classification;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<DocumentStore>,
        registry: Arc<Registry>,
        extractor: Arc<CountingExtractor>,
        oracle: Arc<ScriptedOracle>,
        orchestrator: BatchOrchestrator,
    }

    async fn harness(
        files: &[&str],
        extractor: CountingExtractor,
        oracle: ScriptedOracle,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        std::fs::create_dir_all(&sources).unwrap();
        for f in files {
            std::fs::write(sources.join(f), "placeholder").unwrap();
        }
        let library = Arc::new(LocalLibrary::new(&sources));
        let store = Arc::new(DocumentStore::new(&dir.path().join("catalog")).await.unwrap());
        let registry = Arc::new(Registry::new(&dir.path().join("registry")).await.unwrap());
        let extractor = Arc::new(extractor);
        let oracle = Arc::new(oracle);
        let config = VerifyConfig::default();
        let cancel = CancelFlag::default();
        let verifier = Arc::new(client(oracle.clone()));

        let index = CatalogIndex::build(&library).unwrap();
        let resolver = SourceResolver::new(library.clone(), store.clone(), index);
        let orchestrator = BatchOrchestrator::new(
            Arc::new(resolver),
            Arc::new(DocumentLoader::new(store.clone(), extractor.clone())),
            Arc::new(ChunkAggregator::new(verifier.clone(), &config, cancel.clone())),
            Arc::new(EvidenceSynthesizer::new(verifier, &config)),
            registry.clone(),
            config.workers,
            cancel,
        );
        Harness {
            _dir: dir,
            store,
            registry,
            extractor,
            oracle,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_local_exact_one_extraction_one_call() {
        let h = harness(
            &["Muralidharan_2013.txt"],
            CountingExtractor::new("Voucher recipients scored 0.72 standard deviations higher."),
            ScriptedOracle::new(vec![Ok(r#"{"results": [{"claim_id": "P_FORMAL",
                "classification": "confirmed", "confidence": 92, "evidence": "0.72"}]}"#)]),
        )
        .await;
        let param = parameter("P_FORMAL", vec![citation("c1", "Muralidharan_2013", None)]);

        let report = h.orchestrator.run(vec![param], false).await.unwrap();
        assert_eq!(h.extractor.calls(), 1);
        assert_eq!(h.oracle.calls(), 1);

        let verdict = &report.verdicts[0];
        assert_eq!(verdict.strategies, vec![ResolutionStrategy::LocalExact]);
        assert_eq!(verdict.classification, Classification::Confirmed);
        assert_eq!(verdict.confidence, 92);
        assert!(report.summary.all_resolved());
        assert!(h.registry.latest_verdict("P_FORMAL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shared_document_scanned_once_for_all_parameters() {
        let h = harness(
            &["PLFS_2023.txt"],
            CountingExtractor::new("Formal share 0.72, wage premium 2.25x."),
            ScriptedOracle::always(
                r#"{"results": [
                    {"claim_id": "P1", "classification": "confirmed", "confidence": 90},
                    {"claim_id": "P2", "classification": "approximate", "confidence": 75}]}"#,
            ),
        )
        .await;
        let params = vec![
            parameter("P1", vec![citation("c1", "PLFS_2023.txt", None)]),
            parameter(
                "P2",
                vec![
                    citation("c1", "PLFS 2023 labour force", None),
                    citation("c2", "PLFS_2023", None),
                ],
            ),
        ];

        let report = h.orchestrator.run(params, false).await.unwrap();
        assert_eq!(report.summary.documents, 1);
        assert_eq!(h.extractor.calls(), 1);
        assert_eq!(h.oracle.calls(), 1);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[1].confidence, 75);
        assert_eq!(report.verdicts[1].evidence_source_count(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_parameter_is_not_found_for_review() {
        let h = harness(&[], CountingExtractor::new("unused"), ScriptedOracle::new(vec![])).await;
        let param = parameter("MYSTERY", vec![citation("c1", "Completely unknown source", None)]);

        let report = h.orchestrator.run(vec![param], false).await.unwrap();
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.classification, Classification::NotFound);
        assert_eq!(verdict.confidence, 0);
        assert!(verdict.needs_human_review);
        assert_eq!(report.summary.unresolved_citations, 1);
        assert!(!report.summary.all_resolved());
        assert_eq!(h.oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_document() {
        let mut extractor = CountingExtractor::new("");
        extractor.reliable = false;
        let h = harness(&["Scan_2019.pdf"], extractor, ScriptedOracle::new(vec![])).await;
        let param = parameter("P", vec![citation("c1", "Scan_2019.pdf", None)]);

        let report = h.orchestrator.run(vec![param], false).await.unwrap();
        assert_eq!(report.summary.documents_skipped, 1);
        assert_eq!(report.verdicts[0].classification, Classification::NotFound);
        assert!(report.verdicts[0].needs_human_review);
        assert_eq!(h.oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_resume_skips_and_force_reprocesses() {
        let h = harness(
            &["Chen_2022.txt"],
            CountingExtractor::new("Mincer return of 5.8 percent per year of schooling."),
            ScriptedOracle::always(
                r#"{"results": [{"claim_id": "MINCER", "classification": "confirmed", "confidence": 88}]}"#,
            ),
        )
        .await;
        let param = parameter(
            "MINCER",
            vec![citation("c1", "Chen (2022) returns to schooling", None)],
        );

        h.orchestrator.run(vec![param.clone()], false).await.unwrap();
        assert_eq!(h.oracle.calls(), 1);

        let resumed = h.orchestrator.run(vec![param.clone()], false).await.unwrap();
        assert_eq!(resumed.summary.resumed, 1);
        assert_eq!(resumed.verdicts.len(), 1);
        assert_eq!(h.oracle.calls(), 1);

        let forced = h.orchestrator.run(vec![param], true).await.unwrap();
        assert_eq!(forced.summary.resumed, 0);
        assert_eq!(h.oracle.calls(), 2);
        assert_eq!(h.registry.verdict_history("MINCER").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remote_resolution_writes_back_document_id() {
        let h = harness(
            &[],
            CountingExtractor::new("unused"),
            ScriptedOracle::always(
                r#"{"results": [{"claim_id": "P", "classification": "approximate", "confidence": 70}]}"#,
            ),
        )
        .await;
        let id = h
            .store
            .store(
                "Apprenticeship completion rate 64 percent.",
                NewDocument {
                    name: "dgt-tracer".to_string(),
                    original_url: Some("https://dgt.gov.in/tracer".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let param = parameter(
            "P",
            vec![citation("c1", "DGT tracer study", Some("https://dgt.gov.in/tracer"))],
        );
        h.registry.upsert_parameters(&[param.clone()]).await.unwrap();

        let report = h.orchestrator.run(vec![param], false).await.unwrap();
        assert_eq!(report.verdicts[0].strategies, vec![ResolutionStrategy::RemoteByUrl]);
        // Remote text came from the catalog, not the extractor.
        assert_eq!(h.extractor.calls(), 0);

        let stored = h.registry.get_parameter("P").await.unwrap().unwrap();
        assert_eq!(stored.citations[0].document_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_cancelled_run_persists_nothing() {
        let h = harness(
            &["Chen_2022.txt"],
            CountingExtractor::new("text"),
            ScriptedOracle::always(r#"{"results": []}"#),
        )
        .await;
        h.orchestrator.cancel.cancel();
        let param = parameter("MINCER", vec![citation("c1", "Chen_2022.txt", None)]);

        let report = h.orchestrator.run(vec![param], false).await.unwrap();
        assert_eq!(report.summary.cancelled, 1);
        assert!(report.verdicts.is_empty());
        assert!(h.registry.latest_verdict("MINCER").await.unwrap().is_none());
        assert!(!report.summary.all_resolved());
    }

    #[tokio::test]
    async fn test_shared_document_keeps_each_citation_strategy() {
        let h = harness(
            &["MSDE_2022.txt"],
            CountingExtractor::new("Apprentices earn a 12 percent premium."),
            ScriptedOracle::always(
                r#"{"results": [
                    {"claim_id": "P1", "classification": "confirmed", "confidence": 90},
                    {"claim_id": "P2", "classification": "confirmed", "confidence": 90}]}"#,
            ),
        )
        .await;
        let id = h
            .store
            .store(
                "Apprentices earn a 12 percent premium.",
                NewDocument {
                    name: "MSDE_2022.txt".to_string(),
                    local_filename: Some("MSDE_2022.txt".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut by_id = citation("c1", "skills ministry note", None);
        by_id.document_id = Some(id);
        let params = vec![
            parameter("P1", vec![citation("c1", "MSDE_2022.txt", None)]),
            parameter("P2", vec![by_id]),
        ];

        let report = h.orchestrator.run(params, false).await.unwrap();
        assert_eq!(report.summary.documents, 1);
        assert_eq!(h.oracle.calls(), 1);
        assert_eq!(report.verdicts[0].strategies, vec![ResolutionStrategy::LocalExact]);
        assert_eq!(report.verdicts[1].strategies, vec![ResolutionStrategy::RemoteById]);
        assert_eq!(report.verdicts[1].sources[0].strategy, ResolutionStrategy::RemoteById);
    }
}
