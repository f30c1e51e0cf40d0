use std::sync::Arc;

use tracing::{info, warn};

use super::extract::TextExtractor;
use super::types::{DocLocation, ResolvedDocument};
use super::DocumentStore;
use crate::error::PipelineError;

/// Loads the full text of a resolved document, at most once per document per run.
pub struct DocumentLoader {
    store: Arc<DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
}

impl DocumentLoader {
    pub fn new(store: Arc<DocumentStore>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { store, extractor }
    }

    pub async fn load(&self, doc: &ResolvedDocument) -> Result<Arc<str>, PipelineError> {
        let text = doc
            .text
            .get_or_try_init(|| async {
                let text = match &doc.location {
                    DocLocation::Local(path) => {
                        let extraction = self.extractor.extract(path).await.map_err(|e| {
                            PipelineError::ExtractionFailure {
                                document: doc.name.clone(),
                                reason: format!("{:#}", e),
                            }
                        })?;
                        if !extraction.reliable {
                            return Err(PipelineError::ExtractionFailure {
                                document: doc.name.clone(),
                                reason: "text is empty or needs image recognition".to_string(),
                            });
                        }
                        extraction.text
                    }
                    DocLocation::Remote(id) => self.store.get_text(id).await.map_err(|e| {
                        PipelineError::ExtractionFailure {
                            document: doc.name.clone(),
                            reason: format!("{:#}", e),
                        }
                    })?,
                };
                if text.trim().is_empty() {
                    return Err(PipelineError::ExtractionFailure {
                        document: doc.name.clone(),
                        reason: "extracted text is empty".to_string(),
                    });
                }
                info!(
                    document = %doc.name,
                    location = %doc.location,
                    chars = text.chars().count(),
                    "document text loaded"
                );
                Ok(Arc::<str>::from(text))
            })
            .await;

        match text {
            Ok(text) => Ok(text.clone()),
            Err(e) => {
                warn!(document = %doc.name, "{}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::docs::types::Extraction;

    /// Extractor returning fixed text and counting calls.
    pub struct CountingExtractor {
        pub text: String,
        pub reliable: bool,
        pub calls: AtomicUsize,
    }

    impl CountingExtractor {
        pub fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                reliable: true,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextExtractor for CountingExtractor {
        async fn extract(&self, _path: &Path) -> anyhow::Result<Extraction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Extraction {
                text: self.text.clone(),
                reliable: self.reliable,
            })
        }
    }

    #[tokio::test]
    async fn test_load_once_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::new(dir.path()).await.unwrap());
        let extractor = Arc::new(CountingExtractor::new("Apprentice premium 84000"));
        let loader = DocumentLoader::new(store, extractor.clone());

        let doc = ResolvedDocument::new(DocLocation::Local("/tmp/a.pdf".into()), "a.pdf".into());
        let first = loader.load(&doc).await.unwrap();
        let second = loader.load(&doc).await.unwrap();
        assert_eq!(&*first, "Apprentice premium 84000");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(extractor.calls(), 1);
        assert_eq!(doc.char_len(), Some(24));
    }

    #[tokio::test]
    async fn test_unreliable_text_is_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::new(dir.path()).await.unwrap());
        let mut extractor = CountingExtractor::new("~~ 12 34 ~~");
        extractor.reliable = false;
        let loader = DocumentLoader::new(store, Arc::new(extractor));

        let doc =
            ResolvedDocument::new(DocLocation::Local("/tmp/scan.pdf".into()), "scan.pdf".into());
        assert!(matches!(
            loader.load(&doc).await,
            Err(PipelineError::ExtractionFailure { .. })
        ));
    }
}
