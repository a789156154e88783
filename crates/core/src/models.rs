use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotIndexed,
    Indexing,
    Ready,
    Failed,
}

impl IndexStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexStatus::NotIndexed => "not_indexed",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Ready => "ready",
            IndexStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable per-paper indexing state. Source of truth for whether a paper is
/// searchable; the search engine entry it points to is secondary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperIndexRecord {
    pub paper_id: String,
    pub title: String,
    pub source_url: String,
    pub status: IndexStatus,
    pub chunk_count: usize,
    pub page_count: Option<usize>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub content_hash: Option<String>,
    pub entry_id: Option<String>,
    pub last_error: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; compare-and-swap updates are keyed on it.
    pub version: u64,
}

impl PaperIndexRecord {
    /// Timestamp the eviction clock runs from.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_used_at
            .or(self.last_indexed_at)
            .unwrap_or(self.updated_at)
    }

    pub(crate) fn reset_to_not_indexed(&mut self, now: DateTime<Utc>) {
        self.status = IndexStatus::NotIndexed;
        self.entry_id = None;
        self.chunk_count = 0;
        self.last_error = None;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub paper_id: String,
    pub title: String,
    pub source_url: String,
    pub page_count: Option<usize>,
    pub chunks: Vec<String>,
    pub content_hash: Option<String>,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexOutcome {
    pub ok: bool,
    pub status: IndexStatus,
    pub already_indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexOutcome {
    pub fn indexed(status: IndexStatus, already_indexed: bool) -> Self {
        Self {
            ok: true,
            status,
            already_indexed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: IndexStatus::Failed,
            already_indexed: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub ok: bool,
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub cleaned: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchChunk {
    pub text: String,
    pub page: Option<u32>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub text: String,
    pub chunks: Vec<SearchChunk>,
    pub entry_id: Option<String>,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// Search-engine namespace for one paper. Every character outside
/// `[A-Za-z0-9._-]` becomes `_`, so two papers never share a namespace
/// unless their ids collide after sanitizing.
pub fn paper_namespace(paper_id: &str) -> String {
    let safe: String = paper_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("paper/{safe}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_replaces_unsafe_characters() {
        assert_eq!(paper_namespace("2401.01234v2"), "paper/2401.01234v2");
        assert_eq!(paper_namespace("hep-th/9901001"), "paper/hep-th_9901001");
        assert_eq!(paper_namespace("a b:c"), "paper/a_b_c");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&IndexStatus::NotIndexed).unwrap();
        assert_eq!(json, "\"not_indexed\"");
        assert_eq!(IndexStatus::Ready.to_string(), "ready");
    }

    #[test]
    fn last_activity_falls_back_in_order() {
        let now = Utc::now();
        let mut record = PaperIndexRecord {
            paper_id: "p".to_string(),
            title: "t".to_string(),
            source_url: "u".to_string(),
            status: IndexStatus::Ready,
            chunk_count: 1,
            page_count: None,
            embedding_model: "m".to_string(),
            embedding_dimensions: 8,
            content_hash: None,
            entry_id: None,
            last_error: None,
            last_indexed_at: None,
            last_used_at: None,
            created_at: now,
            updated_at: now - chrono::Duration::days(3),
            version: 1,
        };
        assert_eq!(record.last_activity(), now - chrono::Duration::days(3));

        record.last_indexed_at = Some(now - chrono::Duration::days(2));
        assert_eq!(record.last_activity(), now - chrono::Duration::days(2));

        record.last_used_at = Some(now - chrono::Duration::hours(1));
        assert_eq!(record.last_activity(), now - chrono::Duration::hours(1));
    }
}
