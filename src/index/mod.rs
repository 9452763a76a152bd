//! Index Service integration.
//!
//! Chunking, embedding, and vector storage live in an external service. This
//! module defines the contract the rest of the crate relies on and an HTTP
//! implementation of it.

mod http;

pub use http::HttpIndexService;

use crate::document::{LoadedDocument, basename};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Metadata key the Index Service stores the source path under.
pub const FILENAME_KEY: &str = "filename";

/// A persisted, queryable version of the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRef {
    pub version: String,
}

impl IndexRef {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// A retrieved span of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Basename of the source document; empty when the service did not report one.
    pub filename: String,
    /// Similarity score, higher is more relevant.
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Build a chunk from a raw node, taking the filename from its metadata.
    pub fn from_parts(
        text: String,
        score: Option<f64>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let filename = metadata
            .get(FILENAME_KEY)
            .and_then(|v| v.as_str())
            .map(basename)
            .unwrap_or_default();

        Self {
            text,
            filename,
            score,
            metadata,
        }
    }
}

/// Order chunks by descending score; unscored chunks keep their relative order at the end.
pub fn sort_by_relevance(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// The operations the crate needs from the Index Service.
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Chunk, embed, and stage a document for the next persisted version.
    async fn insert(&self, document: &LoadedDocument) -> Result<()>;

    /// Persist staged documents, returning the new queryable version.
    async fn persist(&self) -> Result<IndexRef>;

    /// The most recently persisted version, if any.
    async fn latest(&self) -> Result<Option<IndexRef>>;

    /// Top-`top_k` chunks of `index` for `query`.
    async fn retrieve(&self, index: &IndexRef, query: &str, top_k: usize) -> Result<Vec<Chunk>>;
}
