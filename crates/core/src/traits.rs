use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub index: usize,
    pub text: String,
    pub page: Option<u32>,
    pub vector: Vec<f32>,
}

/// One document's worth of chunks. Upserting replaces any entry already
/// stored under the same namespace and key.
#[derive(Debug, Clone)]
pub struct EntryUpsert {
    pub namespace: String,
    pub key: String,
    pub title: String,
    pub chunks: Vec<EmbeddedChunk>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineQuery<'a> {
    pub namespace: &'a str,
    pub vector: &'a [f32],
    pub limit: usize,
    pub score_threshold: f64,
    pub context_before: usize,
    pub context_after: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub entry_id: String,
    pub index: usize,
    pub text: String,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: StoredChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EngineHits {
    /// Matches at or above the threshold, best first.
    pub hits: Vec<RankedChunk>,
    /// Neighbors of the matches requested through the context window.
    pub context: Vec<StoredChunk>,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn upsert(&self, entry: EntryUpsert) -> Result<String, EngineError>;

    async fn search(&self, query: EngineQuery<'_>) -> Result<EngineHits, EngineError>;

    async fn delete(&self, entry_id: &str) -> Result<(), EngineError>;
}

#[async_trait]
impl<T: SearchEngine + ?Sized> SearchEngine for Arc<T> {
    async fn upsert(&self, entry: EntryUpsert) -> Result<String, EngineError> {
        (**self).upsert(entry).await
    }

    async fn search(&self, query: EngineQuery<'_>) -> Result<EngineHits, EngineError> {
        (**self).search(query).await
    }

    async fn delete(&self, entry_id: &str) -> Result<(), EngineError> {
        (**self).delete(entry_id).await
    }
}
