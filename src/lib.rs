//! RAG Evaluator - retrieval-augmented question answering with a golden-dataset
//! evaluation harness.
//!
//! # Overview
//!
//! The service side ingests uploaded documents into an external Index Service,
//! answers questions by retrieving the most relevant chunks and asking an
//! OpenAI-compatible Generation Service to synthesize an answer, and reports
//! which documents the answer was grounded in.
//!
//! The evaluation side replays a semicolon-delimited golden dataset against a
//! running service and scores every answer on three axes:
//! 1. Retrieval: did the expected document show up among the sources?
//! 2. Keywords: how many expected keywords appear in the answer?
//! 3. Semantics: does an LLM judge consider the answer equivalent?
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_evaluator::{
//!     config::Config,
//!     eval::{GoldenDataset, Orchestrator, RagClient, write_report},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!
//!     let dataset = GoldenDataset::load(&config.eval.dataset_path)?;
//!     let client = Arc::new(RagClient::new(&config.eval)?);
//!
//!     let mut orchestrator = Orchestrator::keywords(client);
//!     let run = orchestrator.run(&dataset).await?;
//!
//!     write_report(&config.eval.keyword_output_path, &dataset, &run)?;
//!     println!("Retrieval accuracy: {:.0}%", run.metrics.retrieval_accuracy * 100.0);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **IngestionPipeline**: stores uploads, reindexes, and publishes a new query engine
//! - **QueryService**: answers questions against the active index version
//! - **Orchestrator**: runs the golden dataset through the retrieval, keyword, and judge scorers
//! - **server**: axum router exposing `/ingest`, `/query`, and `/query_with_context`

pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod query;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use document::Document;
pub use error::{RagError, Result};
pub use index::{HttpIndexService, IndexRef, IndexService};
pub use ingest::{IngestReport, IngestionPipeline};
pub use llm::{LlmClient, TextGenerator};
pub use query::{Evidence, QueryEngine, QueryOptions, QueryResult, QueryService};
