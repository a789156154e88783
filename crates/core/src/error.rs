use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to fetch PDF ({status})")]
    FetchStatus { status: u16 },

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),

    #[error("pdf exceeds maximum size of {limit} bytes (got {actual})")]
    TooLarge { limit: u64, actual: u64 },

    #[error("invalid pdf url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("embedding dimension {actual} does not match configured {expected}")]
    Dimension { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Fetch(ExtractError),

    #[error(transparent)]
    Parse(ExtractError),

    #[error("{0}")]
    EmptyContent(String),

    #[error("paper {0} is already being indexed")]
    ConcurrentIndexing(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("search configuration changed since last index: {0}")]
    DimensionMismatch(String),

    #[error("search backend error: {0}")]
    Backend(#[from] EngineError),
}

impl From<ExtractError> for IndexError {
    fn from(value: ExtractError) -> Self {
        match value {
            ExtractError::PdfParse(_) => IndexError::Parse(value),
            other => IndexError::Fetch(other),
        }
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
