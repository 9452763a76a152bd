//! Query service: retrieval plus answer synthesis over the active index.
//!
//! The active configuration is an [`Arc<QueryEngine>`] behind a read/write
//! lock. Queries clone the current handle and run without holding the lock;
//! reindexing takes the reindex mutex for its whole insert/persist/publish
//! sequence and swaps the handle in one write.

mod synthesis;

pub use synthesis::{TreeSummarizer, estimate_tokens};

use crate::config::{Config, PromptStyle};
use crate::document::basename;
use crate::error::{RagError, Result};
use crate::index::{Chunk, IndexRef, IndexService, sort_by_relevance};
use crate::llm::TextGenerator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

/// One piece of retrieved evidence as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<Chunk> for Evidence {
    fn from(chunk: Chunk) -> Self {
        Self {
            text: chunk.text,
            score: chunk.score,
            filename: chunk.filename,
            metadata: chunk.metadata,
        }
    }
}

/// Answer plus ranked evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Evidence>,
}

impl QueryResult {
    /// Basenames of the evidence sources, in rank order, skipping unnamed ones.
    pub fn retrieved_filenames(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| basename(&s.filename))
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// Retrieval and synthesis settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub style: PromptStyle,
    pub language: String,
    /// Token budget for one synthesis prompt.
    pub context_window: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 2,
            style: PromptStyle::Improved,
            language: "Deutsch".to_string(),
            context_window: 3000,
        }
    }
}

impl From<&Config> for QueryOptions {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.index.top_k,
            style: config.server.prompt_style,
            language: config.server.language.clone(),
            context_window: config.server.context_window,
        }
    }
}

/// An immutable query configuration bound to one index version.
pub struct QueryEngine {
    index_service: Arc<dyn IndexService>,
    generator: Arc<dyn TextGenerator>,
    index: Option<IndexRef>,
    options: QueryOptions,
}

impl QueryEngine {
    pub fn new(
        index_service: Arc<dyn IndexService>,
        generator: Arc<dyn TextGenerator>,
        index: Option<IndexRef>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index_service,
            generator,
            index,
            options,
        }
    }

    /// Same services and options, bound to another index version.
    fn rebind(&self, index: IndexRef) -> Self {
        Self {
            index_service: Arc::clone(&self.index_service),
            generator: Arc::clone(&self.generator),
            index: Some(index),
            options: self.options.clone(),
        }
    }

    pub fn index(&self) -> Option<&IndexRef> {
        self.index.as_ref()
    }

    async fn answer(&self, query: &str) -> Result<QueryResult> {
        let mut chunks = match &self.index {
            Some(index) => {
                self.index_service
                    .retrieve(index, query, self.options.top_k)
                    .await?
            }
            None => Vec::new(),
        };
        sort_by_relevance(&mut chunks);
        debug!(retrieved = chunks.len(), index = ?self.index, "Retrieved evidence");

        let evidence = chunks.iter().map(|c| c.text.clone()).collect();
        let summarizer = TreeSummarizer::new(
            self.generator.as_ref(),
            self.options.style,
            &self.options.language,
            self.options.context_window,
        );
        let answer = summarizer.summarize(query, evidence).await?;

        Ok(QueryResult {
            query: query.to_string(),
            answer,
            sources: chunks.into_iter().map(Evidence::from).collect(),
        })
    }
}

/// Holds the active [`QueryEngine`] and serializes index updates.
pub struct QueryService {
    active: RwLock<Arc<QueryEngine>>,
    reindex: Mutex<()>,
}

impl QueryService {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            active: RwLock::new(Arc::new(engine)),
            reindex: Mutex::new(()),
        }
    }

    /// The current engine. Callers must not cache it across requests.
    pub async fn engine(&self) -> Arc<QueryEngine> {
        Arc::clone(&*self.active.read().await)
    }

    pub async fn active_index(&self) -> Option<IndexRef> {
        self.engine().await.index().cloned()
    }

    /// Answer text only.
    pub async fn query(&self, text: &str) -> Result<String> {
        Ok(self.query_with_context(text).await?.answer)
    }

    /// Answer plus the evidence it was synthesized from.
    pub async fn query_with_context(&self, text: &str) -> Result<QueryResult> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("No query text detected.".to_string()));
        }

        let engine = self.engine().await;
        let mut result = engine.answer(text).await?;
        result.query = text.to_string();
        Ok(result)
    }

    /// Enter the serialized insert/persist/publish section.
    pub async fn begin_reindex(&self) -> ReindexGuard<'_> {
        ReindexGuard {
            service: self,
            _lock: self.reindex.lock().await,
        }
    }
}

/// Exclusive right to mutate the index and publish the result.
pub struct ReindexGuard<'a> {
    service: &'a QueryService,
    _lock: MutexGuard<'a, ()>,
}

impl ReindexGuard<'_> {
    /// Atomically point the service at `index`.
    pub async fn publish(&self, index: IndexRef) {
        let mut active = self.service.active.write().await;
        let next = active.rebind(index.clone());
        *active = Arc::new(next);
        info!(version = %index, "Published new query configuration");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::mock::{MockIndexService, chunk};
    use crate::llm::mock::MockGenerator;

    fn service_with(index: MockIndexService, generator: MockGenerator) -> QueryService {
        QueryService::new(QueryEngine::new(
            Arc::new(index),
            Arc::new(generator),
            Some(IndexRef::new("v1")),
            QueryOptions {
                top_k: 3,
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid_input() {
        let service = service_with(MockIndexService::default(), MockGenerator::replying("x"));
        for blank in ["", "   ", "\n\t"] {
            let err = service.query(blank).await.unwrap_err();
            assert_eq!(err.kind(), "invalid_input");
        }
    }

    #[tokio::test]
    async fn test_query_with_context_orders_evidence() {
        let index = MockIndexService::with_chunks(vec![
            chunk("Basic kostet 19 Euro", "preise.md", Some(0.41)),
            chunk("Pro kostet 49 Euro", "produkt-pro.md", Some(0.87)),
            chunk("Support per Mail", "support.md", None),
        ]);
        let service = service_with(index, MockGenerator::replying("Pro kostet 49 Euro."));

        let result = service.query_with_context("Was kostet Pro?").await.unwrap();

        assert_eq!(result.query, "Was kostet Pro?");
        assert_eq!(result.answer, "Pro kostet 49 Euro.");
        assert_eq!(
            result.retrieved_filenames(),
            vec!["produkt-pro.md", "preise.md", "support.md"]
        );
        assert_eq!(result.sources[0].score, Some(0.87));
        assert_eq!(result.sources[2].score, None);
    }

    #[tokio::test]
    async fn test_generation_failure_is_tagged() {
        let index = MockIndexService::with_chunks(vec![chunk("x", "x.md", Some(0.5))]);
        let service = service_with(index, MockGenerator::failing("upstream 503"));

        let err = service.query("Frage?").await.unwrap_err();
        assert_eq!(err.kind(), "llm_api");
    }

    #[tokio::test]
    async fn test_no_index_answers_without_evidence() {
        let service = QueryService::new(QueryEngine::new(
            Arc::new(MockIndexService::with_chunks(vec![chunk("x", "x.md", None)])),
            Arc::new(MockGenerator::replying("Dazu liegen mir keine Informationen vor.")),
            None,
            QueryOptions::default(),
        ));

        let result = service.query_with_context("Frage?").await.unwrap();
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_publish_swaps_active_index() {
        let service = service_with(MockIndexService::default(), MockGenerator::replying("x"));
        let before = service.engine().await;
        assert_eq!(service.active_index().await, Some(IndexRef::new("v1")));

        {
            let guard = service.begin_reindex().await;
            guard.publish(IndexRef::new("v2")).await;
        }

        assert_eq!(service.active_index().await, Some(IndexRef::new("v2")));
        // Handles taken before the swap keep their own version.
        assert_eq!(before.index(), Some(&IndexRef::new("v1")));
    }

    #[tokio::test]
    async fn test_reindex_sections_are_serialized() {
        let service = Arc::new(service_with(
            MockIndexService::default(),
            MockGenerator::replying("x"),
        ));

        let guard = service.begin_reindex().await;
        let contender = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let guard = service.begin_reindex().await;
                guard.publish(IndexRef::new("v3")).await;
            })
        };

        tokio::task::yield_now().await;
        guard.publish(IndexRef::new("v2")).await;
        assert_eq!(service.active_index().await, Some(IndexRef::new("v2")));
        drop(guard);

        contender.await.unwrap();
        assert_eq!(service.active_index().await, Some(IndexRef::new("v3")));
    }
}
