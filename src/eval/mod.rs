//! Golden-dataset evaluation of the question-answering service.
//!
//! This module provides:
//! - Golden dataset loading (semicolon-delimited CSV)
//! - Retrieval, keyword, and LLM-as-judge scorers
//! - A sequential orchestrator with judge pacing
//! - CSV/JSON reporting

mod client;
pub mod dataset;
pub mod judge;
pub mod keywords;
pub mod pacing;
pub mod report;
pub mod retrieval;
pub mod runner;

pub use client::{RagBackend, RagClient};
pub use dataset::{GoldenDataset, GoldenQuestion};
pub use judge::{JudgeVerdict, SemanticJudge, Verdict, parse_verdict, strip_code_fences};
pub use keywords::{KeywordMatch, score_keywords};
pub use pacing::Pacer;
pub use report::{format_chunks, print_summary, summary_path, write_report, write_summary};
pub use retrieval::{ExpectedSources, NO_SOURCE_SENTINEL, retrieval_hit};
pub use runner::{
    AggregateMetrics, EvalMode, EvaluationRecord, EvaluationRun, ItemStatus, Orchestrator,
};
