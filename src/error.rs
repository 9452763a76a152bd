//! Error types for the RAG service and its evaluation harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur while ingesting, answering, or evaluating.
#[derive(Error, Debug)]
pub enum RagError {
    /// Caller supplied unusable input (blank query, empty upload).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error reading, writing, or removing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Index Service rejected an insert or a retrieval.
    #[error("Index error: {0}")]
    Index(String),

    /// Documents were inserted but the index could not be persisted or published.
    #[error("Index may be inconsistent and needs reindexing: {0}")]
    IndexPersist(String),

    /// A required service could not be reached at all.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The judge reply was not the required JSON object.
    #[error("Failed to parse judge reply: {0}")]
    JudgeParse(String),

    /// Generation Service API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A request exceeded its timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Golden dataset is malformed.
    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl RagError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable tag identifying the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Io { .. } => "io",
            Self::Index(_) => "index",
            Self::IndexPersist(_) => "index_persist",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::JudgeParse(_) => "judge_parse",
            Self::LlmApi(_) => "llm_api",
            Self::Http(_) => "http",
            Self::Timeout(_) => "timeout",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Dataset(_) => "dataset",
        }
    }

    /// Whether the error originated from the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::Timeout(err.to_string())
        } else if err.is_connect() {
            RagError::ServiceUnavailable(err.to_string())
        } else {
            RagError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization(err.to_string())
    }
}
