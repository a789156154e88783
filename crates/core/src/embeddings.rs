use crate::error::EngineError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const LOCAL_EMBEDDING_MODEL: &str = "local/char-trigram";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded with every index so model changes force a rebuild.
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        (**self).embed_batch(inputs).await
    }
}

/// Hashes character trigrams into a fixed number of buckets. Needs no
/// network, which makes it the offline default.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(inputs.iter().map(|input| self.embed(input)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
    pub max_retries: usize,
    /// Sent as `HTTP-Referer` / `X-Title`, which OpenRouter uses for attribution.
    pub referer: Option<String>,
    pub app_title: Option<String>,
}

/// Client for OpenAI-compatible `/embeddings` endpoints (OpenAI, OpenRouter).
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_retries: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self, EngineError> {
        if config.api_key.trim().is_empty() {
            return Err(EngineError::Request("missing embedding API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|error| EngineError::Request(format!("invalid API key header: {error}")))?;
        headers.insert(AUTHORIZATION, auth);
        for (name, value) in [("http-referer", &config.referer), ("x-title", &config.app_title)] {
            if let Some(value) = value {
                let value = HeaderValue::from_str(value)
                    .map_err(|error| EngineError::Request(format!("invalid {name} header: {error}")))?;
                headers.insert(name, value);
            }
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model,
            dimensions: config.dimensions,
            max_retries: config.max_retries.max(1),
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn backoff(attempt: usize) -> Duration {
        Duration::from_millis(250 * 2u64.saturating_pow(attempt as u32))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let mut attempt = 0usize;
        loop {
            let response = self.client.post(&self.endpoint).json(&request).send().await?;
            let status = response.status();

            if status.is_success() {
                let mut parsed: EmbeddingResponse = response.json().await?;
                parsed.data.sort_by_key(|entry| entry.index);
                if parsed.data.len() != inputs.len() {
                    return Err(EngineError::BackendResponse {
                        backend: "embeddings".to_string(),
                        details: format!(
                            "returned {} embeddings for {} inputs",
                            parsed.data.len(),
                            inputs.len()
                        ),
                    });
                }
                debug!(count = inputs.len(), model = %self.model, "embedded batch");
                return parsed
                    .data
                    .into_iter()
                    .map(|entry| {
                        if entry.embedding.len() == self.dimensions {
                            Ok(entry.embedding)
                        } else {
                            Err(EngineError::Dimension {
                                expected: self.dimensions,
                                actual: entry.embedding.len(),
                            })
                        }
                    })
                    .collect();
            }

            let body = response.text().await.unwrap_or_default();
            attempt += 1;
            if Self::should_retry(status) && attempt < self.max_retries {
                warn!(%status, attempt, "embedding request failed, retrying");
                tokio::time::sleep(Self::backoff(attempt)).await;
                continue;
            }

            return Err(EngineError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{status}: {body}"),
            });
        }
    }
}
