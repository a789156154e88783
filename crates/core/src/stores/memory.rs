use crate::error::EngineError;
use crate::traits::{EngineHits, EngineQuery, EntryUpsert, RankedChunk, SearchEngine, StoredChunk};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredEntry {
    namespace: String,
    key: String,
    chunks: Vec<(StoredChunk, Vec<f32>)>,
}

/// Brute-force cosine search over entries held in memory.
#[derive(Debug, Default)]
pub struct MemorySearchEngine {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl SearchEngine for MemorySearchEngine {
    async fn upsert(&self, entry: EntryUpsert) -> Result<String, EngineError> {
        let entry_id = Uuid::new_v4().to_string();
        let chunks = entry
            .chunks
            .into_iter()
            .map(|chunk| {
                (
                    StoredChunk {
                        entry_id: entry_id.clone(),
                        index: chunk.index,
                        text: chunk.text,
                        page: chunk.page,
                    },
                    chunk.vector,
                )
            })
            .collect();

        let mut entries = self.entries.write().await;
        entries.retain(|_, stored| !(stored.namespace == entry.namespace && stored.key == entry.key));
        entries.insert(
            entry_id.clone(),
            StoredEntry {
                namespace: entry.namespace,
                key: entry.key,
                chunks,
            },
        );
        Ok(entry_id)
    }

    async fn search(&self, query: EngineQuery<'_>) -> Result<EngineHits, EngineError> {
        let entries = self.entries.read().await;

        let mut hits = entries
            .values()
            .filter(|entry| entry.namespace == query.namespace)
            .flat_map(|entry| entry.chunks.iter())
            .map(|(chunk, vector)| RankedChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query.vector, vector),
            })
            .filter(|hit| hit.score >= query.score_threshold)
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk.index.cmp(&right.chunk.index))
        });
        hits.truncate(query.limit);

        let matched = hits
            .iter()
            .map(|hit| (hit.chunk.entry_id.clone(), hit.chunk.index))
            .collect::<BTreeSet<_>>();
        let mut wanted = BTreeSet::new();
        for (entry_id, index) in &matched {
            let start = index.saturating_sub(query.context_before);
            for neighbor in start..=index + query.context_after {
                if !matched.contains(&(entry_id.clone(), neighbor)) {
                    wanted.insert((entry_id.clone(), neighbor));
                }
            }
        }

        let context = wanted
            .into_iter()
            .filter_map(|(entry_id, index)| {
                entries.get(&entry_id).and_then(|entry| {
                    entry
                        .chunks
                        .iter()
                        .find(|(chunk, _)| chunk.index == index)
                        .map(|(chunk, _)| chunk.clone())
                })
            })
            .collect();

        Ok(EngineHits { hits, context })
    }

    async fn delete(&self, entry_id: &str) -> Result<(), EngineError> {
        self.entries.write().await.remove(entry_id);
        Ok(())
    }
}
