use chrono::Utc;
use clap::{Parser, Subcommand};
use paper_index_core::{
    CharacterNgramEmbedder, Embedder, JsonFileRecordStore, MemoryRecordStore, MemorySearchEngine,
    OpenAiEmbedder, OpenAiEmbedderConfig, PaperMetadata, PaperPipeline, PaperSource, PipelineConfig,
    QdrantEngine, RecordStore, SearchEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = PaperPipeline<Arc<dyn RecordStore>, Arc<dyn Embedder>, Arc<dyn SearchEngine>>;

#[derive(Parser)]
#[command(name = "paper-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON pipeline config; omitted fields keep their defaults.
    #[arg(long, env = "PAPER_INDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Record store file shared by every invocation. Only used together with
    /// Qdrant; in-memory vectors get in-memory records.
    #[arg(long, env = "PAPER_INDEX_RECORDS", default_value = "paper-index-records.json")]
    records: PathBuf,

    /// Qdrant base URL. Without it vectors and records are kept in memory for
    /// this run only.
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "paper_chunks")]
    qdrant_collection: String,

    /// Key for an OpenAI-compatible embeddings API. Without it the local
    /// trigram embedder is used.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Embeddings API base URL
    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    embedding_base_url: String,

    /// Embedding model id, overriding the config file.
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Embedding dimensions, overriding the config file.
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    #[arg(long, env = "OPENROUTER_HTTP_REFERER")]
    referer: Option<String>,

    #[arg(long, env = "OPENROUTER_APP_TITLE", default_value = "paper-index")]
    app_title: String,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, extract, chunk and index one paper.
    Index {
        #[arg(long)]
        paper_id: String,
        #[arg(long)]
        title: Option<String>,
        /// PDF URL; defaults to the arXiv PDF for the paper id.
        #[arg(long)]
        url: Option<String>,
        /// Read the PDF from a local file instead of fetching it.
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Re-index even when the content hash is unchanged.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Semantic search within one paper.
    Search {
        #[arg(long)]
        paper_id: String,
        #[arg(long)]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the paper's index record.
    Status {
        #[arg(long)]
        paper_id: String,
    },
    /// Drop the paper's index.
    Delete {
        #[arg(long)]
        paper_id: String,
    },
    /// Evict indexes unused for longer than the stale window.
    Sweep {
        /// Run a single pass and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
        #[arg(long, default_value = "24")]
        interval_hours: u64,
    },
    /// Print the grounded system instruction for a question about a paper.
    Prompt {
        #[arg(long)]
        paper_id: String,
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,
        #[arg(long)]
        published: Option<String>,
        #[arg(long = "abstract", default_value = "")]
        abstract_text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let pipeline = build_pipeline(&cli).await?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        records = %cli.records.display(),
        "paper-index boot"
    );

    match cli.command {
        Command::Index {
            paper_id,
            title,
            url,
            pdf,
            force,
        } => {
            let source = PaperSource {
                title: title.unwrap_or_else(|| paper_id.clone()),
                source_url: url.unwrap_or_else(|| format!("https://arxiv.org/pdf/{paper_id}")),
                paper_id,
            };
            let outcome = match pdf {
                Some(path) => {
                    let bytes = tokio::fs::read(&path).await?;
                    pipeline.index_from_bytes(&source, bytes, force).await?
                }
                None => pipeline.index_from_url(&source, force).await?,
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Search {
            paper_id,
            query,
            limit,
        } => {
            let result = pipeline
                .coordinator()
                .search_paper(&paper_id, &query, limit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Status { paper_id } => {
            let record = pipeline.coordinator().get_index_status(&paper_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Delete { paper_id } => {
            let outcome = pipeline.coordinator().delete_index(&paper_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Sweep {
            once,
            interval_hours,
        } => run_sweep(&pipeline, once, interval_hours).await?,
        Command::Prompt {
            paper_id,
            question,
            title,
            authors,
            published,
            abstract_text,
        } => {
            let paper = PaperMetadata {
                id: paper_id,
                title,
                authors,
                published,
                abstract_text,
            };
            println!("{}", pipeline.chat_instruction(&paper, &question).await);
        }
    }

    Ok(())
}

async fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path).await?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = &cli.embedding_model {
        config.indexing.embedding_model = model.clone();
    }
    if let Some(dimensions) = cli.embedding_dimensions {
        config.indexing.embedding_dimensions = dimensions;
    }

    let embedder: Arc<dyn Embedder> = match &cli.embedding_api_key {
        Some(api_key) => Arc::new(OpenAiEmbedder::new(OpenAiEmbedderConfig {
            base_url: cli.embedding_base_url.clone(),
            api_key: api_key.clone(),
            model: config.indexing.embedding_model.clone(),
            dimensions: config.indexing.embedding_dimensions,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            referer: cli.referer.clone(),
            app_title: Some(cli.app_title.clone()),
        })?),
        None => {
            let embedder = match cli.embedding_dimensions {
                Some(dimensions) => CharacterNgramEmbedder { dimensions },
                None => CharacterNgramEmbedder::default(),
            };
            info!(dimensions = embedder.dimensions, "no embedding API key, using local embedder");
            Arc::new(embedder)
        }
    };

    let engine: Arc<dyn SearchEngine> = match &cli.qdrant_url {
        Some(url) => {
            let engine = QdrantEngine::new(url, &cli.qdrant_collection, embedder.dimensions());
            engine.ensure_collection().await?;
            Arc::new(engine)
        }
        None => {
            warn!("no QDRANT_URL, vectors and records are kept in memory for this run only");
            Arc::new(MemorySearchEngine::new())
        }
    };

    let records = open_records(&cli.records, cli.qdrant_url.is_some()).await?;
    Ok(PaperPipeline::new(config, records, embedder, engine)?)
}

/// Records outlive the process only when the vectors they point to do.
async fn open_records(path: &Path, durable_engine: bool) -> anyhow::Result<Arc<dyn RecordStore>> {
    if durable_engine {
        Ok(Arc::new(JsonFileRecordStore::open(path).await?))
    } else {
        Ok(Arc::new(MemoryRecordStore::new()))
    }
}

async fn run_sweep(pipeline: &Pipeline, once: bool, interval_hours: u64) -> anyhow::Result<()> {
    if once {
        let report = pipeline.coordinator().sweep_stale_entries().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_hours.max(1) * 60 * 60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match pipeline.coordinator().sweep_stale_entries().await {
                    Ok(report) => println!("{}", serde_json::to_string(&report)?),
                    Err(error) => warn!(%error, "stale index sweep failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("sweep loop stopped");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_index_core::{IndexStatus, PaperIndexRecord};
    use tempfile::tempdir;

    fn record(paper_id: &str) -> PaperIndexRecord {
        let now = Utc::now();
        PaperIndexRecord {
            paper_id: paper_id.to_string(),
            title: paper_id.to_string(),
            source_url: format!("https://arxiv.org/pdf/{paper_id}"),
            status: IndexStatus::Ready,
            chunk_count: 3,
            page_count: Some(1),
            embedding_model: "local/char-trigram".to_string(),
            embedding_dimensions: 128,
            content_hash: Some("h".to_string()),
            entry_id: Some("e".to_string()),
            last_error: None,
            last_indexed_at: Some(now),
            last_used_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[tokio::test]
    async fn in_memory_engine_does_not_persist_records() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("records.json");

        let records = open_records(&path, false).await?;
        records.insert(record("2401.00001")).await?;
        assert!(!path.exists());

        let reopened = open_records(&path, false).await?;
        assert!(reopened.get("2401.00001").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn durable_engine_keeps_records_on_disk() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("records.json");

        open_records(&path, true).await?.insert(record("2401.00001")).await?;

        let reopened = open_records(&path, true).await?;
        assert_eq!(
            reopened.get("2401.00001").await?.map(|record| record.status),
            Some(IndexStatus::Ready)
        );
        Ok(())
    }
}
