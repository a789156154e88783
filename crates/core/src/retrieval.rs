use crate::embeddings::Embedder;
use crate::error::{EngineError, IndexError, Result};
use crate::indexer::{IndexCoordinator, WRITE_ATTEMPTS};
use crate::models::{paper_namespace, IndexStatus, SearchChunk, SearchResult};
use crate::store::RecordStore;
use crate::traits::{EngineHits, EngineQuery, SearchEngine};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const GAP_MARKER: &str = "...";

impl<S, E, V> IndexCoordinator<S, E, V>
where
    S: RecordStore,
    E: Embedder,
    V: SearchEngine,
{
    /// Semantic search over one paper's chunks.
    ///
    /// Matches below the score threshold are dropped; each remaining match
    /// brings its neighbors along as context. An empty result is not an
    /// error and leaves the record's usage clock alone.
    pub async fn search_paper(
        &self,
        paper_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResult::empty());
        }

        if let Some(record) = self.records.get(paper_id).await? {
            let model = self.embedder.model_id();
            let dimensions = self.embedder.dimensions();
            if record.entry_id.is_some()
                && (record.embedding_model != model || record.embedding_dimensions != dimensions)
            {
                return Err(IndexError::DimensionMismatch(format!(
                    "paper {paper_id} was indexed with {} ({} dims), current embedder is {model} ({dimensions} dims)",
                    record.embedding_model, record.embedding_dimensions
                )));
            }
        }

        let vector = self
            .embedder
            .embed_batch(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::BackendResponse {
                backend: self.embedder.model_id().to_string(),
                details: "no vector returned for query".to_string(),
            })?;

        let namespace = paper_namespace(paper_id);
        let found = self
            .engine
            .search(EngineQuery {
                namespace: &namespace,
                vector: &vector,
                limit: limit.unwrap_or(self.retrieval.default_limit).max(1),
                score_threshold: self.retrieval.score_threshold,
                context_before: self.retrieval.context_before,
                context_after: self.retrieval.context_after,
            })
            .await?;

        if found.hits.is_empty() {
            debug!(%paper_id, "no chunks above score threshold");
            return Ok(SearchResult::empty());
        }

        let result = SearchResult {
            text: assemble_text(&found),
            entry_id: found.hits.first().map(|hit| hit.chunk.entry_id.clone()),
            chunks: found
                .hits
                .into_iter()
                .map(|hit| SearchChunk {
                    text: hit.chunk.text,
                    page: hit.chunk.page,
                    score: hit.score,
                })
                .collect(),
        };
        debug!(%paper_id, chunks = result.chunks.len(), "search matched");

        self.touch_usage(paper_id).await;
        Ok(result)
    }

    /// Moves `last_used_at` forward on a ready record. Failures are logged;
    /// a search result is never lost over them.
    async fn touch_usage(&self, paper_id: &str) {
        for _ in 0..WRITE_ATTEMPTS {
            let record = match self.records.get(paper_id).await {
                Ok(Some(record)) if record.status == IndexStatus::Ready => record,
                Ok(_) => return,
                Err(error) => {
                    warn!(%paper_id, %error, "failed to read record for usage update");
                    return;
                }
            };

            let now = Utc::now();
            let mut touched = record.clone();
            touched.last_used_at = Some(now);
            touched.updated_at = now;
            match self.records.compare_and_swap(record.version, touched).await {
                Ok(true) => return,
                Ok(false) => continue,
                Err(error) => {
                    warn!(%paper_id, %error, "failed to record paper usage");
                    return;
                }
            }
        }
        warn!(%paper_id, "gave up recording paper usage after repeated conflicts");
    }
}

/// Matches and context chunks in document order, grouped by entry. Adjacent
/// chunks are separated by a blank line and skipped ranges by `...`.
pub fn assemble_text(found: &EngineHits) -> String {
    let mut entry_order = Vec::new();
    let mut by_entry: BTreeMap<&str, BTreeMap<usize, &str>> = BTreeMap::new();

    let chunks = found
        .hits
        .iter()
        .map(|hit| &hit.chunk)
        .chain(found.context.iter());
    for chunk in chunks {
        let entry = by_entry.entry(chunk.entry_id.as_str()).or_insert_with(|| {
            entry_order.push(chunk.entry_id.as_str());
            BTreeMap::new()
        });
        entry.entry(chunk.index).or_insert(chunk.text.as_str());
    }

    let mut sections = Vec::with_capacity(entry_order.len());
    for entry_id in entry_order {
        let Some(chunks) = by_entry.get(entry_id) else {
            continue;
        };
        let mut text = String::new();
        let mut previous: Option<usize> = None;
        for (&index, chunk) in chunks {
            match previous {
                None => {}
                Some(previous) if previous + 1 == index => text.push_str("\n\n"),
                Some(_) => {
                    text.push_str("\n\n");
                    text.push_str(GAP_MARKER);
                    text.push_str("\n\n");
                }
            }
            text.push_str(chunk.trim());
            previous = Some(index);
        }
        sections.push(text);
    }

    sections.join(&format!("\n\n{GAP_MARKER}\n\n"))
}
