pub mod catalog;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::docs::local::LocalLibrary;
use crate::docs::types::{DocId, DocLocation, DocMeta, ResolutionStrategy, ResolvedDocument};
use crate::docs::DocumentStore;
use crate::error::PipelineError;
use crate::registry::types::SourceCitation;
use catalog::CatalogIndex;
use scoring::MIN_FUZZY_SCORE;

/// Outcome of resolving one citation.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: Arc<ResolvedDocument>,
    pub strategy: ResolutionStrategy,
    /// Catalog id of the document, when it has one. Written back onto the
    /// citation so later runs can short-circuit through `RemoteById`.
    pub remote_id: Option<DocId>,
}

struct Located {
    location: DocLocation,
    name: String,
    remote_id: Option<DocId>,
}

/// Maps citations to documents, trying strategies in a fixed order.
///
/// Within one resolver every physical document is represented by a single
/// `ResolvedDocument`, and repeated citations are answered from memory.
pub struct SourceResolver {
    library: Arc<LocalLibrary>,
    store: Arc<DocumentStore>,
    index: CatalogIndex,
    documents: Mutex<HashMap<DocLocation, Arc<ResolvedDocument>>>,
    memo: Mutex<HashMap<String, Option<Resolution>>>,
}

impl SourceResolver {
    pub fn new(library: Arc<LocalLibrary>, store: Arc<DocumentStore>, index: CatalogIndex) -> Self {
        Self {
            library,
            store,
            index,
            documents: Mutex::new(HashMap::new()),
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn memo_key(citation: &SourceCitation) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            citation.text.trim(),
            citation.url.as_deref().unwrap_or(""),
            citation.document_id.as_deref().unwrap_or("")
        )
    }

    pub async fn resolve(&self, citation: &SourceCitation) -> Result<Resolution, PipelineError> {
        let key = Self::memo_key(citation);
        if let Some(cached) = self.memo.lock().await.get(&key) {
            return cached
                .clone()
                .ok_or_else(|| PipelineError::ResolutionFailure(citation.label()));
        }

        let resolution = match self.run_strategies(citation).await {
            Some((located, strategy)) => Some(Resolution {
                document: self.intern(located.location, located.name).await,
                strategy,
                remote_id: located.remote_id,
            }),
            None => None,
        };

        match &resolution {
            Some(r) => info!(
                citation = %citation.label(),
                strategy = %r.strategy,
                document = %r.document.name,
                "citation resolved"
            ),
            None => warn!(citation = %citation.label(), "no strategy resolved citation"),
        }

        self.memo.lock().await.insert(key, resolution.clone());
        resolution.ok_or_else(|| PipelineError::ResolutionFailure(citation.label()))
    }

    async fn run_strategies(
        &self,
        citation: &SourceCitation,
    ) -> Option<(Located, ResolutionStrategy)> {
        let strategies = [
            ResolutionStrategy::LocalExact,
            ResolutionStrategy::RemoteById,
            ResolutionStrategy::RemoteByUrl,
            ResolutionStrategy::LocalFuzzy,
            ResolutionStrategy::RemoteFuzzy,
        ];
        for strategy in strategies {
            let attempt = match strategy {
                ResolutionStrategy::LocalExact => self.local_exact(citation),
                ResolutionStrategy::RemoteById => self.remote_by_id(citation).await,
                ResolutionStrategy::RemoteByUrl => self.remote_by_url(citation).await,
                ResolutionStrategy::LocalFuzzy => Ok(self.local_fuzzy(citation)),
                ResolutionStrategy::RemoteFuzzy => self.remote_fuzzy(citation).await,
            };
            match attempt {
                Ok(Some(located)) => return Some((located, strategy)),
                Ok(None) => debug!(citation = %citation.label(), %strategy, "strategy missed"),
                Err(e) => {
                    warn!(citation = %citation.label(), %strategy, "strategy failed: {:#}", e)
                }
            }
        }
        None
    }

    fn local_exact(&self, citation: &SourceCitation) -> Result<Option<Located>> {
        for key in scoring::exact_keys(&citation.text, citation.url.as_deref()) {
            if let Some(file) = self.library.find_exact(&key)? {
                return Ok(Some(Located {
                    location: DocLocation::Local(file.path),
                    name: file.file_name,
                    remote_id: None,
                }));
            }
        }
        Ok(None)
    }

    async fn remote_by_id(&self, citation: &SourceCitation) -> Result<Option<Located>> {
        let Some(id) = citation.document_id.as_deref() else {
            return Ok(None);
        };
        Ok(self.store.get_meta(id).await?.map(|m| self.locate(m)))
    }

    async fn remote_by_url(&self, citation: &SourceCitation) -> Result<Option<Located>> {
        let Some(url) = citation.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        Ok(self.store.find_by_url(url).await?.map(|m| self.locate(m)))
    }

    fn local_fuzzy(&self, citation: &SourceCitation) -> Option<Located> {
        let tokens = scoring::tokenize_citation(citation.search_text());
        if tokens.is_empty() {
            return None;
        }
        let candidates = self
            .index
            .entries
            .values()
            .map(|entry| (entry, scoring::score(&tokens, &CatalogIndex::tokens(entry))))
            .collect();
        let (entry, score) = scoring::pick_best(candidates, MIN_FUZZY_SCORE)?;
        let path = self.index.path_of(&self.library, &entry.file_name);
        if !path.is_file() {
            warn!(file = %entry.file_name, "catalog index names a missing file");
            return None;
        }
        debug!(file = %entry.file_name, score, "local fuzzy match");
        Some(Located {
            location: DocLocation::Local(path),
            name: entry.file_name.clone(),
            remote_id: None,
        })
    }

    async fn remote_fuzzy(&self, citation: &SourceCitation) -> Result<Option<Located>> {
        let tokens = scoring::tokenize_citation(citation.search_text());
        if tokens.is_empty() {
            return Ok(None);
        }
        let records = self.store.list().await?;
        let candidates = records
            .into_iter()
            .map(|meta| {
                let mut candidate =
                    scoring::tokenize_citation(meta.citation.as_deref().unwrap_or(&meta.name));
                if let Some(year) = meta.year {
                    candidate.insert(year.to_string());
                }
                let s = scoring::score(&tokens, &candidate);
                (meta, s)
            })
            .collect();
        Ok(scoring::pick_best(candidates, MIN_FUZZY_SCORE).map(|(meta, score)| {
            debug!(doc_id = %meta.id, score, "remote fuzzy match");
            self.locate(meta)
        }))
    }

    /// A catalog record that mirrors a local file is that local file.
    fn locate(&self, meta: DocMeta) -> Located {
        let local = meta
            .local_filename
            .as_deref()
            .and_then(|f| self.library.find_by_file_name(f));
        Located {
            location: match local {
                Some(path) => DocLocation::Local(path),
                None => DocLocation::Remote(meta.id.clone()),
            },
            name: meta.local_filename.unwrap_or(meta.name),
            remote_id: Some(meta.id),
        }
    }

    /// One shared `ResolvedDocument` per physical location. The strategy is
    /// not part of it: two citations may reach the same file different ways.
    async fn intern(&self, location: DocLocation, name: String) -> Arc<ResolvedDocument> {
        self.documents
            .lock()
            .await
            .entry(location.clone())
            .or_insert_with(|| Arc::new(ResolvedDocument::new(location, name)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::NewDocument;
    use crate::registry::types::CitationRole;

    struct Fixture {
        _dir: tempfile::TempDir,
        library: Arc<LocalLibrary>,
        store: Arc<DocumentStore>,
    }

    async fn fixture(files: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        std::fs::create_dir_all(&sources).unwrap();
        for f in files {
            std::fs::write(sources.join(f), "some text").unwrap();
        }
        let store = Arc::new(DocumentStore::new(&dir.path().join("catalog")).await.unwrap());
        Fixture {
            library: Arc::new(LocalLibrary::new(sources)),
            store,
            _dir: dir,
        }
    }

    fn resolver(f: &Fixture) -> SourceResolver {
        let index = CatalogIndex::build(&f.library).unwrap();
        SourceResolver::new(f.library.clone(), f.store.clone(), index)
    }

    fn citation(text: &str, url: Option<&str>) -> SourceCitation {
        SourceCitation {
            id: "c1".to_string(),
            text: text.to_string(),
            url: url.map(|u| u.to_string()),
            document_id: None,
            role: CitationRole::Primary,
        }
    }

    #[tokio::test]
    async fn test_local_exact_by_author_year() {
        let f = fixture(&["Muralidharan_2013.txt", "PLFS_2023.pdf"]).await;
        let r = resolver(&f);
        let res = r
            .resolve(&citation("Muralidharan (2013), Journal of Public Economics", None))
            .await
            .unwrap();
        assert_eq!(res.strategy, ResolutionStrategy::LocalExact);
        assert_eq!(res.document.name, "Muralidharan_2013.txt");
    }

    #[tokio::test]
    async fn test_same_citation_same_instance() {
        let f = fixture(&["Muralidharan_2013.txt"]).await;
        let r = resolver(&f);
        let c = citation("Muralidharan_2013.txt", None);
        let a = r.resolve(&c).await.unwrap();
        let b = r.resolve(&c).await.unwrap();
        assert!(Arc::ptr_eq(&a.document, &b.document));

        // A different citation of the same file shares the instance too.
        let other = r.resolve(&citation("Muralidharan 2013", None)).await.unwrap();
        assert!(Arc::ptr_eq(&a.document, &other.document));
    }

    #[tokio::test]
    async fn test_remote_by_id_then_url() {
        let f = fixture(&[]).await;
        let id = f
            .store
            .store(
                "Formal multiplier 2.25",
                NewDocument {
                    name: "wage-gap".to_string(),
                    original_url: Some("https://example.org/wage-gap".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let r = resolver(&f);

        let mut by_id = citation("Unrelated words", None);
        by_id.document_id = Some(id.clone());
        let res = r.resolve(&by_id).await.unwrap();
        assert_eq!(res.strategy, ResolutionStrategy::RemoteById);
        assert_eq!(res.document.location, DocLocation::Remote(id.clone()));

        let res = r
            .resolve(&citation("Other words", Some("http://www.example.org/wage-gap/")))
            .await
            .unwrap();
        assert_eq!(res.strategy, ResolutionStrategy::RemoteByUrl);
        assert_eq!(res.remote_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_local_fuzzy_prefers_acronym_and_rejects_weak_matches() {
        let f = fixture(&[
            "PLFS_Annual_Report_2022-23.pdf",
            "NFHS_5_2022.pdf",
            "Mehrotra_2019_jobs.txt",
        ])
        .await;
        let r = resolver(&f);

        let res = r
            .resolve(&citation("PLFS 2022-23 Annual Report, MoSPI", None))
            .await
            .unwrap();
        assert_eq!(res.strategy, ResolutionStrategy::LocalFuzzy);
        assert_eq!(res.document.name, "PLFS_Annual_Report_2022-23.pdf");

        // Only a bare year in common: below the acceptance threshold everywhere.
        let tied = r.resolve(&citation("Something from 2022 onwards", None)).await;
        assert!(matches!(tied, Err(PipelineError::ResolutionFailure(_))));
    }

    #[tokio::test]
    async fn test_remote_fuzzy_on_citation_metadata() {
        let f = fixture(&[]).await;
        f.store
            .store(
                "ASER findings",
                NewDocument {
                    name: "aser".to_string(),
                    citation: Some("ASER Centre, Annual Status of Education Report".to_string()),
                    year: Some(2018),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let r = resolver(&f);
        let res = r
            .resolve(&citation("ASER 2018 learning levels", None))
            .await
            .unwrap();
        assert_eq!(res.strategy, ResolutionStrategy::RemoteFuzzy);
    }

    #[tokio::test]
    async fn test_remote_record_of_local_file_is_local() {
        let f = fixture(&["MSDE_2022.txt"]).await;
        let id = f
            .store
            .store(
                "text",
                NewDocument {
                    name: "MSDE_2022.txt".to_string(),
                    local_filename: Some("MSDE_2022.txt".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let r = resolver(&f);

        let local = r.resolve(&citation("MSDE_2022.txt", None)).await.unwrap();
        let mut by_id = citation("anything", None);
        by_id.document_id = Some(id);
        let remote = r.resolve(&by_id).await.unwrap();
        assert!(Arc::ptr_eq(&local.document, &remote.document));
        assert_eq!(remote.strategy, ResolutionStrategy::RemoteById);
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted() {
        let f = fixture(&["PLFS_2023.pdf"]).await;
        let r = resolver(&f);
        let res = r.resolve(&citation("Completely unknown source", None)).await;
        assert!(matches!(res, Err(PipelineError::ResolutionFailure(_))));
    }
}
