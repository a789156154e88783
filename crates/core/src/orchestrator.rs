use crate::chunking::chunk_adaptive;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::{ExtractError, IndexError, Result};
use crate::extractor::{extract_document, ExtractedDocument, LopdfExtractor, PdfExtractor};
use crate::fetch::PdfFetcher;
use crate::fingerprint::content_hash;
use crate::grounding::{system_instruction, PromptTemplate};
use crate::indexer::IndexCoordinator;
use crate::models::{IndexOutcome, IndexRequest, PaperMetadata};
use crate::store::RecordStore;
use crate::traits::SearchEngine;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PaperSource {
    pub paper_id: String,
    pub title: String,
    pub source_url: String,
}

impl PaperSource {
    fn request(&self, document: Option<&ExtractedDocument>, force: bool) -> IndexRequest {
        IndexRequest {
            paper_id: self.paper_id.clone(),
            title: self.title.clone(),
            source_url: self.source_url.clone(),
            page_count: document.map(|document| document.page_count),
            chunks: Vec::new(),
            content_hash: None,
            force,
        }
    }
}

/// Runs fetch, extraction, chunking and indexing for one paper, and builds
/// grounded chat instructions from the resulting index.
pub struct PaperPipeline<S, E, V> {
    fetcher: PdfFetcher,
    extractor: Arc<dyn PdfExtractor + Send + Sync>,
    coordinator: IndexCoordinator<S, E, V>,
    config: PipelineConfig,
    template: PromptTemplate,
}

impl<S, E, V> PaperPipeline<S, E, V>
where
    S: RecordStore,
    E: Embedder,
    V: SearchEngine,
{
    pub fn new(config: PipelineConfig, records: S, embedder: E, engine: V) -> Result<Self, ExtractError> {
        let coordinator = IndexCoordinator::new(records, embedder, engine)
            .with_options(config.indexing.clone(), config.retrieval);
        Ok(Self {
            fetcher: PdfFetcher::new(config.fetch.clone())?,
            extractor: Arc::new(LopdfExtractor),
            coordinator,
            config,
            template: PromptTemplate::default(),
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor + Send + Sync>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn coordinator(&self) -> &IndexCoordinator<S, E, V> {
        &self.coordinator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parses PDF bytes on the blocking pool.
    pub async fn extract(&self, bytes: Vec<u8>) -> Result<ExtractedDocument, ExtractError> {
        let extractor = Arc::clone(&self.extractor);
        let layout = self.config.layout;
        let max_pages = self.config.max_pages;

        tokio::task::spawn_blocking(move || {
            extract_document(extractor.as_ref(), &bytes, max_pages, &layout)
        })
        .await
        .map_err(|error| ExtractError::PdfParse(format!("extraction task failed: {error}")))?
    }

    pub async fn index_from_url(&self, source: &PaperSource, force: bool) -> Result<IndexOutcome> {
        match self.fetcher.fetch(&source.source_url).await {
            Ok(bytes) => self.index_from_bytes(source, bytes, force).await,
            Err(error) => {
                let error = IndexError::from(error);
                self.coordinator
                    .record_failure(&source.request(None, force), &error)
                    .await
            }
        }
    }

    pub async fn index_from_bytes(
        &self,
        source: &PaperSource,
        bytes: Vec<u8>,
        force: bool,
    ) -> Result<IndexOutcome> {
        let document = match self.extract(bytes).await {
            Ok(document) => document,
            Err(error) => {
                let error = IndexError::from(error);
                return self
                    .coordinator
                    .record_failure(&source.request(None, force), &error)
                    .await;
            }
        };

        // Page markers alone are not content.
        let has_text = document.page_texts.iter().any(|page| !page.trim().is_empty());
        let plan = chunk_adaptive(
            if has_text { document.full_text.as_str() } else { "" },
            &self.config.chunking,
        );
        info!(
            paper_id = %source.paper_id,
            pages = document.page_count,
            chunk_count = plan.chunks.len(),
            naive_count = plan.naive_count,
            profile = ?plan.profile,
            "paper chunked"
        );

        let mut request = source.request(Some(&document), force);
        request.content_hash = Some(content_hash(&document.full_text));
        request.chunks = plan.chunks;
        self.coordinator.index_paper(request).await
    }

    /// System instruction for a chat turn about `paper`. Retrieval failures
    /// degrade to the ungrounded instruction.
    pub async fn chat_instruction(&self, paper: &PaperMetadata, question: &str) -> String {
        let context = match self.coordinator.search_paper(&paper.id, question, None).await {
            Ok(result) => {
                debug!(paper_id = %paper.id, chunks = result.chunks.len(), "retrieved context");
                Some(result.text)
            }
            Err(error) => {
                warn!(paper_id = %paper.id, %error, "retrieval failed, answering without paper text");
                None
            }
        };
        system_instruction(&self.template, paper, context.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchOptions;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::{PageRuns, TextRun};
    use crate::grounding::NOT_IN_PAPER;
    use crate::indexer::EMPTY_CONTENT_ERROR;
    use crate::models::IndexStatus;
    use crate::stores::{MemoryRecordStore, MemorySearchEngine};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Ignores the bytes and returns fixed pages.
    struct FixedPages(Vec<Vec<&'static str>>);

    impl PdfExtractor for FixedPages {
        fn extract_runs(&self, _bytes: &[u8], _max_pages: Option<usize>) -> Result<PageRuns, ExtractError> {
            let pages = self
                .0
                .iter()
                .map(|lines| {
                    lines
                        .iter()
                        .enumerate()
                        .map(|(row, line)| TextRun::new(*line, 0.0, 700.0 - row as f32 * 14.0))
                        .collect()
                })
                .collect();
            Ok(PageRuns {
                total_pages: self.0.len(),
                pages,
            })
        }
    }

    fn pipeline(
        extractor: FixedPages,
    ) -> PaperPipeline<MemoryRecordStore, CharacterNgramEmbedder, MemorySearchEngine> {
        let config = PipelineConfig {
            fetch: FetchOptions {
                allowed_hosts: vec!["127.0.0.1".to_string()],
                ..FetchOptions::default()
            },
            ..PipelineConfig::default()
        };
        PaperPipeline::new(
            config,
            MemoryRecordStore::new(),
            CharacterNgramEmbedder::default(),
            MemorySearchEngine::new(),
        )
        .unwrap()
        .with_extractor(Arc::new(extractor))
    }

    fn source(url: &str) -> PaperSource {
        PaperSource {
            paper_id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            source_url: url.to_string(),
        }
    }

    fn metadata() -> PaperMetadata {
        PaperMetadata {
            id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            authors: vec!["Ashish Vaswani".to_string()],
            published: Some("2017-06-12".to_string()),
            abstract_text: "We propose the Transformer.".to_string(),
        }
    }

    #[tokio::test]
    async fn indexes_extracted_pages_and_grounds_the_prompt() {
        let pipeline = pipeline(FixedPages(vec![
            vec!["Scaled dot-product attention divides by the square root", "of the key dimension."],
            vec!["Multi-head attention projects queries keys and values."],
        ]));

        let outcome = pipeline
            .index_from_bytes(&source("https://arxiv.org/pdf/1706.03762"), b"%PDF".to_vec(), false)
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::indexed(IndexStatus::Ready, false));

        let record = pipeline.coordinator().get_index_status("1706.03762").await.unwrap().unwrap();
        assert_eq!(record.page_count, Some(2));
        assert_eq!(record.chunk_count, 1);
        assert_eq!(record.content_hash.as_ref().map(String::len), Some(64));

        let again = pipeline
            .index_from_bytes(&source("https://arxiv.org/pdf/1706.03762"), b"%PDF".to_vec(), false)
            .await
            .unwrap();
        assert!(again.already_indexed);

        let instruction = pipeline
            .chat_instruction(&metadata(), "Multi-head attention projects queries keys and values.")
            .await;
        assert!(instruction.contains("[PAGE 2]"));
        assert!(!instruction.contains(NOT_IN_PAPER));
    }

    #[tokio::test]
    async fn empty_pdf_text_is_a_failed_index() {
        let pipeline = pipeline(FixedPages(vec![vec![], vec![]]));

        let outcome = pipeline
            .index_from_bytes(&source("https://arxiv.org/pdf/1706.03762"), Vec::new(), false)
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::failed(EMPTY_CONTENT_ERROR));

        let record = pipeline.coordinator().get_index_status("1706.03762").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert_eq!(record.page_count, Some(2));
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let pipeline = pipeline(FixedPages(vec![]));

        let outcome = pipeline
            .index_from_url(&source(&format!("{}/pdf/1706.03762", server.uri())), false)
            .await
            .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("failed to fetch PDF (503)"));

        let record = pipeline.coordinator().get_index_status("1706.03762").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("failed to fetch PDF (503)"));
    }

    #[tokio::test]
    async fn unindexed_paper_gets_the_abstract_only_prompt() {
        let pipeline = pipeline(FixedPages(vec![]));
        let instruction = pipeline.chat_instruction(&metadata(), "What is the BLEU score?").await;
        assert!(instruction.contains(NOT_IN_PAPER));
        assert!(instruction.contains("We propose the Transformer."));
    }
}
