//! Application state for shared services

use crate::ingest::IngestionPipeline;
use crate::query::QueryService;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub ingestion: Arc<IngestionPipeline>,
    /// HTML page served at `/`.
    pub chat_page: PathBuf,
}

impl AppState {
    pub fn new(
        query: Arc<QueryService>,
        ingestion: Arc<IngestionPipeline>,
        chat_page: impl Into<PathBuf>,
    ) -> Self {
        Self {
            query,
            ingestion,
            chat_page: chat_page.into(),
        }
    }
}
