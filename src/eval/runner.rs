//! Evaluation orchestrator.
//!
//! Drives the golden dataset through a [`RagBackend`] one question at a time,
//! scores every answer, and aggregates the run.

use super::client::RagBackend;
use super::dataset::{GoldenDataset, GoldenQuestion};
use super::judge::{JudgeVerdict, SemanticJudge, Verdict};
use super::keywords::{KeywordMatch, score_keywords};
use super::pacing::Pacer;
use super::retrieval::retrieval_hit;
use crate::error::Result;
use crate::query::QueryResult;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Which scorers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Retrieval and keyword scoring only.
    Keywords,
    /// Retrieval, keywords, and the semantic judge.
    Full,
}

/// Per-question outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemStatus {
    /// Every scorer passed.
    Ok,
    /// At least one scorer passed.
    Partial,
    /// No scorer passed.
    Fail,
    /// The question could not be answered.
    Error,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::Partial => "PARTIAL",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Everything recorded for one golden question.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub question: GoldenQuestion,
    /// On failure the answer is `ERROR: <reason>` and there are no sources.
    pub result: QueryResult,
    pub error: Option<String>,
    pub retrieved_files: Vec<String>,
    pub retrieval_hit: bool,
    pub keywords: KeywordMatch,
    pub judge: Option<JudgeVerdict>,
    pub status: ItemStatus,
}

impl EvaluationRecord {
    /// Retrieval hit, full keyword match, and (when judged) a judge pass.
    pub fn is_perfect(&self) -> bool {
        self.status == ItemStatus::Ok
    }
}

/// Aggregate metrics of a run. Rates are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total: usize,
    pub retrieval_hits: usize,
    pub retrieval_accuracy: f64,
    pub mean_keyword_ratio: f64,
    pub judge_passes: Option<usize>,
    pub judge_pass_rate: Option<f64>,
    pub judge_errors: usize,
    pub perfect: usize,
    pub perfect_rate: f64,
    pub failed_queries: usize,
}

impl AggregateMetrics {
    pub fn from_records(records: &[EvaluationRecord], mode: EvalMode) -> Self {
        let total = records.len();
        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        let retrieval_hits = records.iter().filter(|r| r.retrieval_hit).count();
        let keyword_sum: f64 = records.iter().map(|r| r.keywords.ratio).sum();
        let perfect = records.iter().filter(|r| r.is_perfect()).count();
        let judge_passes = (mode == EvalMode::Full).then(|| {
            records
                .iter()
                .filter(|r| r.judge.as_ref().is_some_and(JudgeVerdict::passed))
                .count()
        });
        let judge_errors = records
            .iter()
            .filter(|r| {
                r.judge
                    .as_ref()
                    .is_some_and(|j| j.verdict == Verdict::Error)
            })
            .count();

        Self {
            total,
            retrieval_hits,
            retrieval_accuracy: rate(retrieval_hits),
            mean_keyword_ratio: if total == 0 {
                0.0
            } else {
                keyword_sum / total as f64
            },
            judge_passes,
            judge_pass_rate: judge_passes.map(rate),
            judge_errors,
            perfect,
            perfect_rate: rate(perfect),
            failed_queries: records
                .iter()
                .filter(|r| r.status == ItemStatus::Error)
                .count(),
        }
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub mode: EvalMode,
    pub records: Vec<EvaluationRecord>,
    pub metrics: AggregateMetrics,
    pub duration_secs: f64,
}

/// Sequential evaluation driver.
pub struct Orchestrator {
    backend: Arc<dyn RagBackend>,
    judge: Option<SemanticJudge>,
    pacer: Pacer,
}

impl Orchestrator {
    /// Retrieval and keyword scoring only.
    pub fn keywords(backend: Arc<dyn RagBackend>) -> Self {
        Self {
            backend,
            judge: None,
            pacer: Pacer::from_millis(0),
        }
    }

    /// All scorers; judge calls are spaced by `pacer`.
    pub fn full(backend: Arc<dyn RagBackend>, judge: SemanticJudge, pacer: Pacer) -> Self {
        Self {
            backend,
            judge: Some(judge),
            pacer,
        }
    }

    pub fn mode(&self) -> EvalMode {
        if self.judge.is_some() {
            EvalMode::Full
        } else {
            EvalMode::Keywords
        }
    }

    /// Evaluate every question in order.
    ///
    /// Fails only when the pre-flight probe cannot reach the backend;
    /// per-question failures are recorded and the run continues.
    pub async fn run(&mut self, dataset: &GoldenDataset) -> Result<EvaluationRun> {
        self.backend.ping().await?;

        let mode = self.mode();
        let start = Instant::now();
        let total = dataset.len();
        info!(questions = total, mode = ?mode, "Starting evaluation");

        let mut records = Vec::with_capacity(total);
        for (idx, question) in dataset.questions.iter().enumerate() {
            info!("[{}/{}] {}", idx + 1, total, preview(&question.question, 80));
            let record = self.evaluate(question).await;
            log_record(&record);
            records.push(record);
        }

        let metrics = AggregateMetrics::from_records(&records, mode);
        Ok(EvaluationRun {
            mode,
            records,
            metrics,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    async fn evaluate(&mut self, question: &GoldenQuestion) -> EvaluationRecord {
        let (result, error) = match self.backend.query_with_context(&question.question).await {
            Ok(result) => (result, None),
            Err(e) => {
                warn!(error = %e, "Query failed");
                let reason = e.to_string();
                let result = QueryResult {
                    query: question.question.clone(),
                    answer: format!("ERROR: {}", reason),
                    sources: Vec::new(),
                };
                (result, Some(reason))
            }
        };

        let retrieved_files = result.retrieved_filenames();
        let hit = retrieval_hit(&question.expected_document_spec, &retrieved_files);
        let answer_text = if error.is_some() { "" } else { result.answer.as_str() };
        let keywords = score_keywords(&question.expected_keywords, answer_text);

        let judge = match &self.judge {
            None => None,
            Some(_) if error.is_some() => Some(JudgeVerdict::query_failed()),
            Some(judge) => {
                self.pacer.wait().await;
                Some(
                    judge
                        .judge(
                            &question.question,
                            &question.expected_answer,
                            &result.answer,
                            &question.rationale,
                        )
                        .await,
                )
            }
        };

        let status = item_status(error.is_some(), hit, &keywords, judge.as_ref());
        EvaluationRecord {
            question: question.clone(),
            result,
            error,
            retrieved_files,
            retrieval_hit: hit,
            keywords,
            judge,
            status,
        }
    }
}

fn item_status(
    failed: bool,
    hit: bool,
    keywords: &KeywordMatch,
    judge: Option<&JudgeVerdict>,
) -> ItemStatus {
    if failed {
        return ItemStatus::Error;
    }

    let judge_passed = judge.map(JudgeVerdict::passed);
    if hit && keywords.is_complete() && judge_passed.unwrap_or(true) {
        ItemStatus::Ok
    } else if hit || !keywords.found.is_empty() || judge_passed == Some(true) {
        ItemStatus::Partial
    } else {
        ItemStatus::Fail
    }
}

fn log_record(record: &EvaluationRecord) {
    let retrieval = if record.retrieval_hit { "HIT" } else { "MISS" };
    let keywords = format!("{}/{}", record.keywords.found.len(), record.keywords.expected());

    match &record.judge {
        Some(judge) => info!(
            "  Retrieval: {} | Keywords: {} | Judge: {} | {}",
            retrieval, keywords, judge.verdict, record.status
        ),
        None => info!(
            "  Retrieval: {} | Keywords: {} | {}",
            retrieval, keywords, record.status
        ),
    }

    if !record.keywords.missing.is_empty() {
        info!("  Missing keywords: {}", record.keywords.missing.join(", "));
    }
    if let Some(judge) = record.judge.as_ref().filter(|j| !j.passed()) {
        info!("  Reason: {}", judge.reason);
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::client::mock::MockBackend;
    use crate::llm::mock::MockGenerator;

    const DATASET: &str = "\
frage;warum;erwartete_antwort;erwartetes_dokument;erwartete_keywords
Was kostet Pro?;Preis;49 Euro pro Monat;preise.md|produkt-pro.md;49 Euro,Monat
Wer darf Nutzer loeschen?;Rechte;Nur der Owner;rollen.md;Owner
";

    fn dataset() -> GoldenDataset {
        GoldenDataset::from_reader(DATASET.as_bytes()).unwrap()
    }

    fn backend() -> MockBackend {
        MockBackend::new()
            .answer(
                "Was kostet Pro?",
                "Pro kostet 49 Euro im Monat.",
                &[("data/produkt-pro.md", Some(0.91)), ("faq.md", Some(0.4))],
            )
            .answer(
                "Wer darf Nutzer loeschen?",
                "Dazu liegen mir keine Informationen vor.",
                &[("preise.md", Some(0.2))],
            )
    }

    fn judge_by_answer() -> SemanticJudge {
        SemanticJudge::new(Arc::new(MockGenerator::with(|user| {
            if user.contains("49 Euro im Monat") {
                Ok(r#"{"verdict": "YES", "reason": "korrekt"}"#.to_string())
            } else {
                Ok(r#"{"verdict": "NO", "reason": "Owner fehlt"}"#.to_string())
            }
        })))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_row_run_hit_and_miss() {
        let mut orchestrator =
            Orchestrator::full(Arc::new(backend()), judge_by_answer(), Pacer::from_millis(500));

        let run = orchestrator.run(&dataset()).await.unwrap();

        assert_eq!(run.mode, EvalMode::Full);
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.metrics.retrieval_accuracy, 0.5);
        assert_eq!(run.metrics.mean_keyword_ratio, 0.5);
        assert_eq!(run.metrics.judge_passes, Some(1));
        assert_eq!(run.metrics.judge_pass_rate, Some(0.5));
        assert_eq!(run.metrics.perfect, 1);
        assert_eq!(run.metrics.perfect_rate, 0.5);

        assert_eq!(run.records[0].status, ItemStatus::Ok);
        assert_eq!(run.records[1].status, ItemStatus::Fail);
        assert_eq!(run.records[1].judge.as_ref().unwrap().reason, "Owner fehlt");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_yields_identical_metrics() {
        let backend: Arc<dyn RagBackend> = Arc::new(backend());
        let mut first =
            Orchestrator::full(backend.clone(), judge_by_answer(), Pacer::from_millis(10));
        let mut second = Orchestrator::full(backend, judge_by_answer(), Pacer::from_millis(10));

        let a = first.run(&dataset()).await.unwrap();
        let b = second.run(&dataset()).await.unwrap();
        assert_eq!(a.metrics, b.metrics);
    }

    #[tokio::test]
    async fn test_keywords_mode_skips_judge() {
        let mut orchestrator = Orchestrator::keywords(Arc::new(backend()));
        let run = orchestrator.run(&dataset()).await.unwrap();

        assert_eq!(run.mode, EvalMode::Keywords);
        assert!(run.records.iter().all(|r| r.judge.is_none()));
        assert_eq!(run.metrics.judge_passes, None);
        assert_eq!(run.metrics.perfect, 1);
        assert_eq!(run.records[0].keywords.found, vec!["49 Euro", "Monat"]);
    }

    #[tokio::test]
    async fn test_preflight_failure_halts_before_any_question() {
        let backend = Arc::new(MockBackend::default());
        let mut orchestrator = Orchestrator::keywords(backend.clone());

        let err = orchestrator.run(&dataset()).await.unwrap_err();

        assert_eq!(err.kind(), "service_unavailable");
        assert!(backend.asked.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_query_is_recorded_and_run_continues() {
        let generator = Arc::new(MockGenerator::replying(r#"{"verdict":"YES","reason":"ok"}"#));
        let backend = MockBackend::new().answer(
            "Wer darf Nutzer loeschen?",
            "Nur der Owner.",
            &[("rollen.md", Some(0.7))],
        );
        let mut orchestrator = Orchestrator::full(
            Arc::new(backend),
            SemanticJudge::new(generator.clone()),
            Pacer::from_millis(500),
        );

        let run = orchestrator.run(&dataset()).await.unwrap();

        let failed = &run.records[0];
        assert_eq!(failed.status, ItemStatus::Error);
        assert!(failed.result.answer.starts_with("ERROR: "));
        assert_eq!(failed.judge, Some(JudgeVerdict::query_failed()));
        assert!(!failed.retrieval_hit);

        assert_eq!(run.records[1].status, ItemStatus::Ok);
        assert_eq!(run.metrics.failed_queries, 1);
        // Judge only called for the answered question.
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_error_is_not_a_pass() {
        let judge = SemanticJudge::new(Arc::new(MockGenerator::replying("kein JSON")));
        let mut orchestrator =
            Orchestrator::full(Arc::new(backend()), judge, Pacer::from_millis(0));

        let run = orchestrator.run(&dataset()).await.unwrap();

        assert_eq!(run.metrics.judge_passes, Some(0));
        assert_eq!(run.metrics.judge_errors, 2);
        assert_eq!(run.records[0].judge.as_ref().unwrap().verdict, Verdict::Error);
        assert_eq!(run.records[0].status, ItemStatus::Partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_calls_are_paced() {
        let mut orchestrator =
            Orchestrator::full(Arc::new(backend()), judge_by_answer(), Pacer::from_millis(500));
        let start = tokio::time::Instant::now();

        orchestrator.run(&dataset()).await.unwrap();

        assert!(start.elapsed() >= std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_item_status() {
        let full = score_keywords("a", "a");
        let none = score_keywords("a", "");
        let yes = JudgeVerdict {
            verdict: Verdict::Yes,
            reason: String::new(),
        };
        let no = JudgeVerdict {
            verdict: Verdict::No,
            reason: String::new(),
        };

        assert_eq!(item_status(false, true, &full, None), ItemStatus::Ok);
        assert_eq!(item_status(false, true, &full, Some(&yes)), ItemStatus::Ok);
        assert_eq!(item_status(false, true, &full, Some(&no)), ItemStatus::Partial);
        assert_eq!(item_status(false, false, &none, Some(&yes)), ItemStatus::Partial);
        assert_eq!(item_status(false, false, &none, Some(&no)), ItemStatus::Fail);
        assert_eq!(item_status(true, true, &full, None), ItemStatus::Error);
    }

    #[test]
    fn test_item_status_without_expected_keywords() {
        let vacuous = score_keywords("", "irgendeine Antwort");
        let no = JudgeVerdict {
            verdict: Verdict::No,
            reason: String::new(),
        };

        assert_eq!(vacuous.ratio, 1.0);
        assert_eq!(item_status(false, false, &vacuous, Some(&no)), ItemStatus::Fail);
        assert_eq!(item_status(false, false, &vacuous, None), ItemStatus::Fail);
        assert_eq!(item_status(false, true, &vacuous, Some(&no)), ItemStatus::Partial);
    }

    #[test]
    fn test_empty_run_metrics() {
        let metrics = AggregateMetrics::from_records(&[], EvalMode::Full);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.retrieval_accuracy, 0.0);
        assert_eq!(metrics.judge_pass_rate, Some(0.0));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("kurz", 80), "kurz");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("äöüß", 2), "äö...");
    }
}
