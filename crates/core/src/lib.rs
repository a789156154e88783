pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod fingerprint;
pub mod grounding;
pub mod indexer;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod pages;
pub mod retrieval;
pub mod store;
pub mod stores;
pub mod sweep;
pub mod traits;

pub use chunking::{chunk_adaptive, chunk_text, AdaptiveChunking, ChunkPlan, ChunkProfile, ChunkingConfig};
pub use config::{
    FetchOptions, IndexingOptions, LayoutOptions, PipelineConfig, RetrievalOptions,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_SCORE_THRESHOLD, DEFAULT_SEARCH_LIMIT,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, OpenAiEmbedderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS, LOCAL_EMBEDDING_MODEL,
};
pub use error::{ConfigError, EngineError, ExtractError, IndexError, StoreError};
pub use extractor::{
    document_from_runs, extract_document, ExtractedDocument, LopdfExtractor, PageRuns, PdfExtractor,
    TextRun,
};
pub use fetch::PdfFetcher;
pub use fingerprint::content_hash;
pub use grounding::{system_instruction, PromptTemplate, NOT_IN_PAPER};
pub use indexer::{IndexCoordinator, EMPTY_CONTENT_ERROR};
pub use layout::{merge_hyphenated_lines, normalize_whitespace, remove_repeated_headers_footers};
pub use models::{
    paper_namespace, DeleteOutcome, IndexOutcome, IndexRequest, IndexStatus, PaperIndexRecord,
    PaperMetadata, SearchChunk, SearchResult, SweepReport,
};
pub use orchestrator::{PaperPipeline, PaperSource};
pub use pages::{count_page_markers, page_marker, page_references, tag_pages};
pub use retrieval::assemble_text;
pub use store::{RecordPage, RecordStore, StatusPages};
pub use stores::{JsonFileRecordStore, MemoryRecordStore, MemorySearchEngine, QdrantEngine};
pub use traits::{EmbeddedChunk, EngineHits, EngineQuery, EntryUpsert, RankedChunk, SearchEngine, StoredChunk};
