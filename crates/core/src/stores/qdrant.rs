use crate::error::EngineError;
use crate::traits::{EngineHits, EngineQuery, EntryUpsert, RankedChunk, SearchEngine, StoredChunk};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Qdrant REST adapter. All papers share one collection; the `namespace`
/// payload field keeps their chunks apart and every query filters on it.
pub struct QdrantEngine {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantEngine {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    /// Creates the collection when missing. An existing collection must have
    /// the configured vector size.
    pub async fn ensure_collection(&self) -> Result<(), EngineError> {
        let response = self.client.get(self.url("")).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            let created = self
                .client
                .put(self.url(""))
                .json(&json!({
                    "vectors": { "size": self.vector_size, "distance": "Cosine" }
                }))
                .send()
                .await?;
            check_status(created.status())?;
            for field in ["namespace", "entry_id"] {
                let indexed = self
                    .client
                    .put(self.url("/index?wait=true"))
                    .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                    .send()
                    .await?;
                check_status(indexed.status())?;
            }
            debug!(collection = %self.collection, size = self.vector_size, "created collection");
            return Ok(());
        }

        check_status(response.status())?;
        let parsed: Value = response.json().await?;
        let size = parsed
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|size| size as usize);

        match size {
            Some(size) if size != self.vector_size => Err(EngineError::Dimension {
                expected: self.vector_size,
                actual: size,
            }),
            _ => Ok(()),
        }
    }

    async fn delete_by_filter(&self, filter: Value) -> Result<(), EngineError> {
        let response = self
            .client
            .post(self.url("/points/delete?wait=true"))
            .json(&json!({ "filter": filter }))
            .send()
            .await?;
        check_status(response.status())
    }

    async fn neighbors(
        &self,
        entry_id: &str,
        indices: &BTreeSet<usize>,
    ) -> Result<Vec<StoredChunk>, EngineError> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.url("/points/scroll"))
            .json(&json!({
                "filter": {
                    "must": [
                        match_field("entry_id", entry_id),
                        { "key": "chunk_index", "match": { "any": indices } }
                    ]
                },
                "limit": indices.len(),
                "with_payload": true,
                "with_vector": false,
            }))
            .send()
            .await?;
        check_status(response.status())?;

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(points
            .iter()
            .filter_map(|point| stored_chunk(point.get("payload")?))
            .filter(|chunk| indices.contains(&chunk.index))
            .collect())
    }
}

fn check_status(status: StatusCode) -> Result<(), EngineError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(EngineError::BackendResponse {
            backend: "qdrant".to_string(),
            details: status.to_string(),
        })
    }
}

fn match_field(key: &str, value: &str) -> Value {
    json!({ "key": key, "match": { "value": value } })
}

fn stored_chunk(payload: &Value) -> Option<StoredChunk> {
    Some(StoredChunk {
        entry_id: payload.get("entry_id")?.as_str()?.to_string(),
        index: payload.get("chunk_index")?.as_u64()? as usize,
        text: payload.get("text")?.as_str()?.to_string(),
        page: payload
            .get("page")
            .and_then(Value::as_u64)
            .map(|page| page as u32),
    })
}

#[async_trait]
impl SearchEngine for QdrantEngine {
    async fn upsert(&self, entry: EntryUpsert) -> Result<String, EngineError> {
        let entry_id = Uuid::new_v4();

        let points = entry
            .chunks
            .iter()
            .map(|chunk| {
                if chunk.vector.len() != self.vector_size {
                    return Err(EngineError::Dimension {
                        expected: self.vector_size,
                        actual: chunk.vector.len(),
                    });
                }
                let point_id = Uuid::new_v5(&entry_id, &chunk.index.to_le_bytes());
                Ok(json!({
                    "id": point_id.to_string(),
                    "vector": chunk.vector,
                    "payload": {
                        "namespace": entry.namespace,
                        "key": entry.key,
                        "title": entry.title,
                        "entry_id": entry_id.to_string(),
                        "chunk_index": chunk.index,
                        "page": chunk.page,
                        "text": chunk.text,
                    },
                }))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        if !points.is_empty() {
            let response = self
                .client
                .put(self.url("/points?wait=true"))
                .json(&json!({ "points": points }))
                .send()
                .await?;
            check_status(response.status())?;
        }

        // Older entries for the same key go only after the new points are durable.
        self.delete_by_filter(json!({
            "must": [
                match_field("namespace", &entry.namespace),
                match_field("key", &entry.key),
            ],
            "must_not": [match_field("entry_id", &entry_id.to_string())],
        }))
        .await?;

        Ok(entry_id.to_string())
    }

    async fn search(&self, query: EngineQuery<'_>) -> Result<EngineHits, EngineError> {
        if query.vector.len() != self.vector_size {
            return Err(EngineError::Dimension {
                expected: self.vector_size,
                actual: query.vector.len(),
            });
        }

        let response = self
            .client
            .post(self.url("/points/search"))
            .json(&json!({
                "vector": query.vector,
                "limit": query.limit,
                "score_threshold": query.score_threshold,
                "with_payload": true,
                "filter": { "must": [match_field("namespace", query.namespace)] },
            }))
            .send()
            .await?;
        check_status(response.status())?;

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|hit| {
                Some(RankedChunk {
                    chunk: stored_chunk(hit.get("payload")?)?,
                    score: hit.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                })
            })
            .collect::<Vec<_>>();

        let mut context = Vec::new();
        let entries = hits
            .iter()
            .map(|hit| hit.chunk.entry_id.clone())
            .collect::<BTreeSet<_>>();
        for entry_id in entries {
            let matched = hits
                .iter()
                .filter(|hit| hit.chunk.entry_id == entry_id)
                .map(|hit| hit.chunk.index)
                .collect::<BTreeSet<_>>();
            let mut wanted = BTreeSet::new();
            for index in &matched {
                for neighbor in index.saturating_sub(query.context_before)..=index + query.context_after {
                    if !matched.contains(&neighbor) {
                        wanted.insert(neighbor);
                    }
                }
            }
            context.extend(self.neighbors(&entry_id, &wanted).await?);
        }

        Ok(EngineHits { hits, context })
    }

    async fn delete(&self, entry_id: &str) -> Result<(), EngineError> {
        self.delete_by_filter(json!({ "must": [match_field("entry_id", entry_id)] }))
            .await
    }
}
