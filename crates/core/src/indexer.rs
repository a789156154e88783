use crate::config::{chrono_duration, IndexingOptions, RetrievalOptions};
use crate::embeddings::Embedder;
use crate::error::{EngineError, IndexError, Result};
use crate::models::{
    paper_namespace, DeleteOutcome, IndexOutcome, IndexRequest, IndexStatus, PaperIndexRecord,
};
use crate::pages::page_references;
use crate::store::RecordStore;
use crate::traits::{EmbeddedChunk, EntryUpsert, SearchEngine};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Record writes that lose a compare-and-swap race are retried this many times.
pub(crate) const WRITE_ATTEMPTS: usize = 4;

pub const EMPTY_CONTENT_ERROR: &str = "No PDF text extracted to index.";

/// Owns the per-paper index lifecycle: `not_indexed`, `indexing`, `ready`
/// and `failed`. Every transition re-reads the record and writes it back
/// with a compare-and-swap on its version.
pub struct IndexCoordinator<S, E, V> {
    pub(crate) records: S,
    pub(crate) embedder: E,
    pub(crate) engine: V,
    pub(crate) indexing: IndexingOptions,
    pub(crate) retrieval: RetrievalOptions,
}

enum Claim {
    Done(IndexOutcome),
    Owned(PaperIndexRecord),
}

impl<S, E, V> IndexCoordinator<S, E, V>
where
    S: RecordStore,
    E: Embedder,
    V: SearchEngine,
{
    pub fn new(records: S, embedder: E, engine: V) -> Self {
        Self {
            records,
            embedder,
            engine,
            indexing: IndexingOptions::default(),
            retrieval: RetrievalOptions::default(),
        }
    }

    pub fn with_options(mut self, indexing: IndexingOptions, retrieval: RetrievalOptions) -> Self {
        self.indexing = indexing;
        self.retrieval = retrieval;
        self
    }

    pub fn records(&self) -> &S {
        &self.records
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn engine(&self) -> &V {
        &self.engine
    }

    pub async fn get_index_status(&self, paper_id: &str) -> Result<Option<PaperIndexRecord>> {
        Ok(self.records.get(paper_id).await?)
    }

    /// Embeds and stores `request.chunks` for the paper.
    ///
    /// A paper already being indexed, or already indexed with the same
    /// content hash and embedding setup, is reported without doing any work.
    /// Failures after the record was claimed are written as `failed` and
    /// returned as an unsuccessful outcome; only record store errors
    /// surface as `Err`.
    pub async fn index_paper(&self, request: IndexRequest) -> Result<IndexOutcome> {
        let owned = match self.claim(&request).await {
            Ok(Claim::Done(outcome)) => return Ok(outcome),
            Ok(Claim::Owned(record)) => record,
            Err(IndexError::ConcurrentIndexing(paper_id)) => {
                info!(%paper_id, "indexing already in progress");
                return Ok(IndexOutcome::indexed(IndexStatus::Indexing, true));
            }
            Err(error) => return Err(error),
        };

        info!(
            paper_id = %request.paper_id,
            chunk_count = request.chunks.len(),
            model = self.embedder.model_id(),
            "indexing paper"
        );
        match self.embed_and_upsert(&request).await {
            Ok(entry_id) => self.complete(owned, entry_id).await,
            Err(error) => self.fail(owned, error).await,
        }
    }

    /// Drops the paper's engine entry and resets its record to `not_indexed`.
    /// Engine errors propagate and leave the record untouched.
    pub async fn delete_index(&self, paper_id: &str) -> Result<DeleteOutcome> {
        let not_indexed = DeleteOutcome {
            ok: true,
            status: IndexStatus::NotIndexed,
        };

        for _ in 0..WRITE_ATTEMPTS {
            let Some(record) = self.records.get(paper_id).await? else {
                return Ok(not_indexed);
            };
            if let Some(entry_id) = &record.entry_id {
                self.engine.delete(entry_id).await?;
            }

            let mut reset = record.clone();
            reset.reset_to_not_indexed(Utc::now());
            if self.records.compare_and_swap(record.version, reset).await? {
                info!(%paper_id, previous = %record.status, "index deleted");
                return Ok(not_indexed);
            }
            debug!(%paper_id, "record changed during delete, retrying");
        }

        Err(IndexError::ConcurrentIndexing(paper_id.to_string()))
    }

    /// Records an error raised before any chunks existed, such as a failed
    /// fetch or an unparseable PDF. A running job keeps its claim and a
    /// `ready` index stays searchable; both only see the error reported.
    pub async fn record_failure(
        &self,
        request: &IndexRequest,
        error: &IndexError,
    ) -> Result<IndexOutcome> {
        let message = error.to_string();
        warn!(paper_id = %request.paper_id, error = %message, "paper could not be prepared for indexing");

        for _ in 0..WRITE_ATTEMPTS {
            let now = Utc::now();
            let existing = self.records.get(&request.paper_id).await?;
            let written = match &existing {
                Some(record) if record.status == IndexStatus::Indexing && !self.lease_expired(record, now) => {
                    return Ok(IndexOutcome::indexed(IndexStatus::Indexing, true));
                }
                Some(record) if record.status == IndexStatus::Ready => {
                    return Ok(IndexOutcome::failed(message));
                }
                Some(record) => {
                    let mut failed = record.clone();
                    failed.status = IndexStatus::Failed;
                    failed.entry_id = None;
                    failed.last_error = Some(message.clone());
                    failed.updated_at = now;
                    let written = self.records.compare_and_swap(record.version, failed).await?;
                    if written {
                        self.discard_entry(&record.paper_id, record.entry_id.as_deref()).await;
                    }
                    written
                }
                None => {
                    let mut failed = self.claimed_record(None, request, now);
                    failed.status = IndexStatus::Failed;
                    failed.chunk_count = 0;
                    failed.last_error = Some(message.clone());
                    self.records.insert(failed).await?
                }
            };
            if written {
                return Ok(IndexOutcome::failed(message));
            }
        }

        Err(IndexError::ConcurrentIndexing(request.paper_id.clone()))
    }

    async fn claim(&self, request: &IndexRequest) -> Result<Claim> {
        for _ in 0..WRITE_ATTEMPTS {
            let now = Utc::now();
            let existing = self.records.get(&request.paper_id).await?;

            if let Some(record) = &existing {
                if record.status == IndexStatus::Indexing {
                    if !self.lease_expired(record, now) {
                        return Err(IndexError::ConcurrentIndexing(request.paper_id.clone()));
                    }
                    warn!(
                        paper_id = %record.paper_id,
                        since = %record.updated_at,
                        "taking over abandoned indexing job"
                    );
                }
                if !request.force && self.is_current(record, request) {
                    debug!(paper_id = %record.paper_id, "content unchanged, index kept");
                    return Ok(Claim::Done(IndexOutcome::indexed(IndexStatus::Ready, true)));
                }
            }

            let next = self.claimed_record(existing.as_ref(), request, now);
            let written = match &existing {
                None => self.records.insert(next.clone()).await?,
                Some(current) => {
                    self.records
                        .compare_and_swap(current.version, next.clone())
                        .await?
                }
            };
            if !written {
                debug!(paper_id = %request.paper_id, "record changed while claiming, retrying");
                continue;
            }

            if next.status == IndexStatus::Failed {
                warn!(paper_id = %request.paper_id, "{EMPTY_CONTENT_ERROR}");
                let previous = existing.as_ref().and_then(|record| record.entry_id.as_deref());
                self.discard_entry(&request.paper_id, previous).await;
                return Ok(Claim::Done(IndexOutcome::failed(
                    next.last_error.unwrap_or_default(),
                )));
            }
            return Ok(Claim::Owned(next));
        }

        Err(IndexError::ConcurrentIndexing(request.paper_id.clone()))
    }

    fn lease_expired(&self, record: &PaperIndexRecord, now: DateTime<Utc>) -> bool {
        now - record.updated_at > chrono_duration(self.indexing.indexing_lease)
    }

    fn is_current(&self, record: &PaperIndexRecord, request: &IndexRequest) -> bool {
        let same_hash = matches!(
            (&record.content_hash, &request.content_hash),
            (Some(stored), Some(incoming)) if stored == incoming
        );
        record.status == IndexStatus::Ready
            && same_hash
            && record.embedding_model == self.embedder.model_id()
            && record.embedding_dimensions == self.embedder.dimensions()
    }

    /// The record as it should look once this request owns it. Requests
    /// without chunks go straight to `failed` and drop the previous entry.
    fn claimed_record(
        &self,
        existing: Option<&PaperIndexRecord>,
        request: &IndexRequest,
        now: DateTime<Utc>,
    ) -> PaperIndexRecord {
        let (status, last_error) = if request.chunks.is_empty() {
            let error = IndexError::EmptyContent(EMPTY_CONTENT_ERROR.to_string());
            (IndexStatus::Failed, Some(error.to_string()))
        } else {
            (IndexStatus::Indexing, None)
        };

        PaperIndexRecord {
            paper_id: request.paper_id.clone(),
            title: request.title.clone(),
            source_url: request.source_url.clone(),
            status,
            chunk_count: request.chunks.len(),
            page_count: request
                .page_count
                .or_else(|| existing.and_then(|record| record.page_count)),
            embedding_model: self.embedder.model_id().to_string(),
            embedding_dimensions: self.embedder.dimensions(),
            content_hash: request.content_hash.clone(),
            entry_id: existing
                .filter(|_| status == IndexStatus::Indexing)
                .and_then(|record| record.entry_id.clone()),
            last_error,
            last_indexed_at: existing.and_then(|record| record.last_indexed_at),
            last_used_at: existing.and_then(|record| record.last_used_at),
            created_at: existing.map_or(now, |record| record.created_at),
            updated_at: now,
            version: existing.map_or(1, |record| record.version + 1),
        }
    }

    async fn embed_and_upsert(&self, request: &IndexRequest) -> Result<String> {
        let expected = self.embedder.dimensions();
        let batch_size = self.indexing.embedding_batch_size.max(1);

        let mut vectors = Vec::with_capacity(request.chunks.len());
        for inputs in request.chunks.chunks(batch_size) {
            let embedded = self.embedder.embed_batch(inputs).await?;
            if embedded.len() != inputs.len() {
                return Err(EngineError::BackendResponse {
                    backend: self.embedder.model_id().to_string(),
                    details: format!("expected {} vectors, got {}", inputs.len(), embedded.len()),
                }
                .into());
            }
            if let Some(vector) = embedded.iter().find(|vector| vector.len() != expected) {
                return Err(EngineError::Dimension {
                    expected,
                    actual: vector.len(),
                }
                .into());
            }
            vectors.extend(embedded);
        }

        let chunks = request
            .chunks
            .iter()
            .zip(page_references(&request.chunks))
            .zip(vectors)
            .enumerate()
            .map(|(index, ((text, page), vector))| EmbeddedChunk {
                index,
                text: text.clone(),
                page,
                vector,
            })
            .collect();

        let entry_id = self
            .engine
            .upsert(EntryUpsert {
                namespace: paper_namespace(&request.paper_id),
                key: request.paper_id.clone(),
                title: request.title.clone(),
                chunks,
            })
            .await?;
        Ok(entry_id)
    }

    async fn complete(&self, owned: PaperIndexRecord, entry_id: String) -> Result<IndexOutcome> {
        let now = Utc::now();
        let mut ready = owned.clone();
        ready.status = IndexStatus::Ready;
        ready.entry_id = Some(entry_id.clone());
        ready.last_error = None;
        ready.last_indexed_at = Some(now);
        ready.updated_at = now;

        if self.records.compare_and_swap(owned.version, ready).await? {
            info!(
                paper_id = %owned.paper_id,
                chunk_count = owned.chunk_count,
                %entry_id,
                "paper indexed"
            );
            return Ok(IndexOutcome::indexed(IndexStatus::Ready, false));
        }
        self.lost_ownership(&owned, Some(&entry_id)).await
    }

    async fn fail(&self, owned: PaperIndexRecord, error: IndexError) -> Result<IndexOutcome> {
        let message = error.to_string();
        warn!(paper_id = %owned.paper_id, error = %message, "indexing failed");

        let mut failed = owned.clone();
        failed.status = IndexStatus::Failed;
        failed.entry_id = None;
        failed.last_error = Some(message.clone());
        failed.updated_at = Utc::now();

        if self.records.compare_and_swap(owned.version, failed).await? {
            self.discard_entry(&owned.paper_id, owned.entry_id.as_deref()).await;
            return Ok(IndexOutcome::failed(message));
        }
        self.lost_ownership(&owned, None).await
    }

    /// The record moved on while this job ran. The job's entry is removed
    /// and the current status reported instead of overwriting the record.
    async fn lost_ownership(
        &self,
        owned: &PaperIndexRecord,
        entry_id: Option<&str>,
    ) -> Result<IndexOutcome> {
        self.discard_entry(&owned.paper_id, entry_id).await;

        let status = self
            .records
            .get(&owned.paper_id)
            .await?
            .map_or(IndexStatus::NotIndexed, |record| record.status);
        warn!(paper_id = %owned.paper_id, %status, "record changed while indexing, result discarded");
        Ok(IndexOutcome::indexed(status, false))
    }

    /// Best-effort removal of an entry no record points to any more.
    async fn discard_entry(&self, paper_id: &str, entry_id: Option<&str>) {
        let Some(entry_id) = entry_id else {
            return;
        };
        match self.engine.delete(entry_id).await {
            Ok(()) => debug!(%paper_id, %entry_id, "removed unreferenced entry"),
            Err(error) => warn!(%paper_id, %entry_id, %error, "failed to remove unreferenced entry"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::{MemoryRecordStore, MemorySearchEngine};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Local embedder that counts batches and can be held at a gate.
    #[derive(Default)]
    pub(crate) struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        pub(crate) calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl CountingEmbedder {
        pub(crate) fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions
        }

        async fn embed_batch(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(EngineError::Request("embedding provider unavailable".to_string()));
            }
            self.inner.embed_batch(inputs).await
        }
    }

    pub(crate) type TestCoordinator =
        IndexCoordinator<MemoryRecordStore, CountingEmbedder, MemorySearchEngine>;

    pub(crate) fn coordinator(embedder: CountingEmbedder) -> TestCoordinator {
        IndexCoordinator::new(MemoryRecordStore::new(), embedder, MemorySearchEngine::new())
    }

    pub(crate) fn request(paper_id: &str) -> IndexRequest {
        IndexRequest {
            paper_id: paper_id.to_string(),
            title: "Attention Is All You Need".to_string(),
            source_url: format!("https://arxiv.org/pdf/{paper_id}"),
            page_count: Some(2),
            chunks: vec![
                "[PAGE 1]\nThe transformer relies entirely on attention.".to_string(),
                "Multi-head attention runs several heads in parallel.".to_string(),
                "[PAGE 2]\nPositional encodings inject order information.".to_string(),
            ],
            content_hash: Some("hash-1".to_string()),
            force: false,
        }
    }

    async fn index_then_release(coordinator: &TestCoordinator, gate: &Notify) -> Result<IndexOutcome> {
        let outcome = coordinator.index_paper(request("1706.03762")).await;
        gate.notify_one();
        outcome
    }

    #[tokio::test]
    async fn concurrent_requests_run_one_embedding_job() {
        let gate = Arc::new(Notify::new());
        let coordinator = coordinator(CountingEmbedder::gated(gate.clone()));

        let (first, second) = tokio::join!(
            index_then_release(&coordinator, &gate),
            index_then_release(&coordinator, &gate)
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|outcome| outcome.already_indexed);

        assert_eq!(outcomes[0], IndexOutcome::indexed(IndexStatus::Ready, false));
        assert_eq!(outcomes[1], IndexOutcome::indexed(IndexStatus::Indexing, true));
        assert_eq!(coordinator.embedder().calls(), 1);

        let record = coordinator.get_index_status("1706.03762").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Ready);
        assert_eq!(record.chunk_count, 3);
        assert!(record.entry_id.is_some());
        assert!(record.last_indexed_at.is_some());
    }

    #[tokio::test]
    async fn unchanged_content_skips_embedding() {
        let coordinator = coordinator(CountingEmbedder::default());
        coordinator.index_paper(request("p1")).await.unwrap();
        let calls = coordinator.embedder().calls();

        let outcome = coordinator.index_paper(request("p1")).await.unwrap();
        assert_eq!(outcome, IndexOutcome::indexed(IndexStatus::Ready, true));
        assert_eq!(coordinator.embedder().calls(), calls);
    }

    #[tokio::test]
    async fn forced_or_changed_content_reindexes_in_place() {
        let coordinator = coordinator(CountingEmbedder::default());
        coordinator.index_paper(request("p1")).await.unwrap();
        let first_entry = coordinator.get_index_status("p1").await.unwrap().unwrap().entry_id;

        let mut forced = request("p1");
        forced.force = true;
        let outcome = coordinator.index_paper(forced).await.unwrap();
        assert_eq!(outcome, IndexOutcome::indexed(IndexStatus::Ready, false));

        let mut changed = request("p1");
        changed.content_hash = Some("hash-2".to_string());
        coordinator.index_paper(changed).await.unwrap();

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_ne!(record.entry_id, first_entry);
        assert_eq!(record.content_hash.as_deref(), Some("hash-2"));
        assert_eq!(coordinator.embedder().calls(), 3);
        assert_eq!(coordinator.engine().entry_count().await, 1);
    }

    #[tokio::test]
    async fn missing_hash_never_counts_as_unchanged() {
        let coordinator = coordinator(CountingEmbedder::default());
        let mut unhashed = request("p1");
        unhashed.content_hash = None;
        coordinator.index_paper(unhashed.clone()).await.unwrap();

        let outcome = coordinator.index_paper(unhashed).await.unwrap();
        assert!(!outcome.already_indexed);
        assert_eq!(coordinator.embedder().calls(), 2);
    }

    #[tokio::test]
    async fn zero_chunks_fail_immediately() {
        let coordinator = coordinator(CountingEmbedder::default());
        let mut empty = request("p1");
        empty.chunks.clear();

        let outcome = coordinator.index_paper(empty).await.unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.status, IndexStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some(EMPTY_CONTENT_ERROR));

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert!(record.last_error.is_some());
        assert_eq!(coordinator.embedder().calls(), 0);
    }

    #[tokio::test]
    async fn embedding_error_is_recorded_as_failed() {
        let coordinator = coordinator(CountingEmbedder::failing());

        let outcome = coordinator.index_paper(request("p1")).await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("embedding provider unavailable"));

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert!(record.last_error.unwrap().contains("embedding provider unavailable"));
        assert_eq!(coordinator.engine().entry_count().await, 0);
    }

    #[tokio::test]
    async fn zero_chunk_reindex_drops_the_previous_entry() {
        let coordinator = coordinator(CountingEmbedder::default());
        coordinator.index_paper(request("p1")).await.unwrap();
        assert_eq!(coordinator.engine().entry_count().await, 1);

        let mut empty = request("p1");
        empty.chunks.clear();
        empty.content_hash = Some("hash-2".to_string());
        let outcome = coordinator.index_paper(empty).await.unwrap();
        assert_eq!(outcome, IndexOutcome::failed(EMPTY_CONTENT_ERROR));

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert_eq!(record.entry_id, None);
        assert_eq!(coordinator.engine().entry_count().await, 0);
    }

    #[tokio::test]
    async fn failed_reindex_drops_the_previous_entry() {
        let coordinator = coordinator(CountingEmbedder::failing());
        let entry_id = coordinator
            .engine()
            .upsert(EntryUpsert {
                namespace: paper_namespace("p1"),
                key: "p1".to_string(),
                title: "Attention Is All You Need".to_string(),
                chunks: vec![EmbeddedChunk {
                    index: 0,
                    text: "old text".to_string(),
                    page: Some(1),
                    vector: vec![1.0; coordinator.embedder().dimensions()],
                }],
            })
            .await
            .unwrap();
        let mut ready = coordinator.claimed_record(None, &request("p1"), Utc::now());
        ready.status = IndexStatus::Ready;
        ready.entry_id = Some(entry_id);
        ready.content_hash = Some("hash-0".to_string());
        coordinator.records().put(ready).await;

        let outcome = coordinator.index_paper(request("p1")).await.unwrap();
        assert!(!outcome.ok);

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::Failed);
        assert_eq!(record.entry_id, None);
        assert_eq!(coordinator.engine().entry_count().await, 0);
    }

    #[tokio::test]
    async fn fresh_indexing_is_respected_and_abandoned_one_taken_over() {
        let coordinator = coordinator(CountingEmbedder::default());
        let now = Utc::now();
        let mut stuck = coordinator.claimed_record(None, &request("p1"), now);
        coordinator.records().put(stuck.clone()).await;

        let outcome = coordinator.index_paper(request("p1")).await.unwrap();
        assert_eq!(outcome, IndexOutcome::indexed(IndexStatus::Indexing, true));
        assert_eq!(coordinator.embedder().calls(), 0);

        stuck.updated_at = now - chrono::Duration::hours(2);
        coordinator.records().put(stuck).await;

        let outcome = coordinator.index_paper(request("p1")).await.unwrap();
        assert_eq!(outcome, IndexOutcome::indexed(IndexStatus::Ready, false));
    }

    #[tokio::test]
    async fn delete_resets_record_and_removes_entry() {
        let coordinator = coordinator(CountingEmbedder::default());
        coordinator.index_paper(request("p1")).await.unwrap();

        let outcome = coordinator.delete_index("p1").await.unwrap();
        assert_eq!(outcome.status, IndexStatus::NotIndexed);

        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::NotIndexed);
        assert_eq!(record.entry_id, None);
        assert_eq!(record.chunk_count, 0);
        assert_eq!(coordinator.engine().entry_count().await, 0);

        let missing = coordinator.delete_index("never-seen").await.unwrap();
        assert!(missing.ok);
        assert_eq!(missing.status, IndexStatus::NotIndexed);
    }

    #[tokio::test]
    async fn delete_while_indexing_discards_the_running_job() {
        let gate = Arc::new(Notify::new());
        let coordinator = coordinator(CountingEmbedder::gated(gate.clone()));

        let (indexed, deleted) = tokio::join!(coordinator.index_paper(request("p1")), async {
            loop {
                let record = coordinator.get_index_status("p1").await.unwrap();
                if record.map(|record| record.status) == Some(IndexStatus::Indexing) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            let deleted = coordinator.delete_index("p1").await;
            gate.notify_one();
            deleted
        });

        assert_eq!(deleted.unwrap().status, IndexStatus::NotIndexed);
        assert_eq!(
            indexed.unwrap(),
            IndexOutcome::indexed(IndexStatus::NotIndexed, false)
        );
        let record = coordinator.get_index_status("p1").await.unwrap().unwrap();
        assert_eq!(record.status, IndexStatus::NotIndexed);
        assert_eq!(coordinator.engine().entry_count().await, 0);
    }
}
