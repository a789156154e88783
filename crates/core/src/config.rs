use crate::chunking::AdaptiveChunking;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_MODEL: &str = "qwen/qwen3-embedding-8b";
pub const DEFAULT_SEARCH_LIMIT: usize = 8;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub allowed_hosts: Vec<String>,
    pub max_bytes: u64,
    /// Size of each `Range` request when the server supports partial content.
    pub range_chunk_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            allowed_hosts: vec![
                "arxiv.org".to_string(),
                "www.arxiv.org".to_string(),
                "export.arxiv.org".to_string(),
            ],
            max_bytes: 50 * 1024 * 1024,
            range_chunk_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Maximum vertical distance between runs that still belong to one line.
    pub line_merge_threshold: f32,
    pub header_footer_lines: usize,
    pub header_footer_repeat_ratio: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            line_merge_threshold: 2.0,
            header_footer_lines: 2,
            header_footer_repeat_ratio: 0.6,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingOptions {
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,
    /// An `indexing` record untouched for longer than this is treated as abandoned.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub indexing_lease: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stale_after: Duration,
    pub sweep_page_size: usize,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: 1024,
            embedding_batch_size: 64,
            indexing_lease: Duration::from_secs(30 * 60),
            stale_after: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub default_limit: usize,
    pub score_threshold: f64,
    pub context_before: usize,
    pub context_after: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            context_before: 1,
            context_after: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch: FetchOptions,
    pub layout: LayoutOptions,
    pub chunking: AdaptiveChunking,
    pub indexing: IndexingOptions,
    pub retrieval: RetrievalOptions,
    /// Optional page cap applied during extraction.
    pub max_pages: Option<usize>,
}

impl PipelineConfig {
    pub async fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::try_seconds(duration.as_secs() as i64).unwrap_or(chrono::Duration::MAX)
}
