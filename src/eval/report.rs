//! Evaluation reports: per-item CSV, JSON summary, console summary.

use super::dataset::GoldenDataset;
use super::runner::{AggregateMetrics, EvalMode, EvaluationRecord, EvaluationRun};
use crate::document::basename;
use crate::error::{RagError, Result};
use crate::query::Evidence;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

const KEYWORD_COLUMNS: &[&str] = &["keyword_found", "keyword_missing", "keyword_score"];
const JUDGE_COLUMNS: &[&str] = &["judge_verdict", "judge_reason"];

/// Render evidence as `[Chunk i | filename (score: x.xxxx)]` blocks joined by `\n---\n`.
pub fn format_chunks(sources: &[Evidence]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let name = basename(&source.filename);
            let name = if name.is_empty() { "unknown" } else { name.as_str() };
            let score = source
                .score
                .map(|s| format!(" (score: {:.4})", s))
                .unwrap_or_default();
            format!("[Chunk {} | {}{}]\n{}", i + 1, name, score, source.text)
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn report_headers(dataset_headers: &[String], mode: EvalMode) -> Vec<String> {
    let mut headers = dataset_headers.to_vec();
    headers.extend(
        ["rag_answer", "retrieved_chunks", "retrieval_hit", "retrieved_files"]
            .iter()
            .chain(KEYWORD_COLUMNS)
            .map(|s| s.to_string()),
    );
    if mode == EvalMode::Full {
        headers.extend(JUDGE_COLUMNS.iter().map(|s| s.to_string()));
    }
    headers.push("status".to_string());
    headers
}

fn report_row(record: &EvaluationRecord, mode: EvalMode) -> Vec<String> {
    let mut row = record.question.row.clone();
    row.push(record.result.answer.clone());
    row.push(format_chunks(&record.result.sources));
    row.push(if record.retrieval_hit { "TRUE" } else { "FALSE" }.to_string());
    row.push(record.retrieved_files.join(", "));
    row.push(record.keywords.found.join(", "));
    row.push(record.keywords.missing.join(", "));
    row.push(format!("{:.2}", record.keywords.ratio));
    if mode == EvalMode::Full {
        match &record.judge {
            Some(judge) => {
                row.push(judge.verdict.to_string());
                row.push(judge.reason.clone());
            }
            None => row.extend([String::new(), String::new()]),
        }
    }
    row.push(record.status.to_string());
    row
}

/// Write the per-item report as semicolon-delimited CSV.
pub fn write_report(path: &Path, dataset: &GoldenDataset, run: &EvaluationRun) -> Result<()> {
    let file = File::create(path).map_err(|e| RagError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(file);
    let csv_err = |e: csv::Error| RagError::Serialization(format!("{}: {}", path.display(), e));

    writer
        .write_record(report_headers(&dataset.headers, run.mode))
        .map_err(csv_err)?;
    for record in &run.records {
        writer.write_record(report_row(record, run.mode)).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| RagError::io(path, e))?;
    Ok(())
}

/// Location of the JSON summary that accompanies `report`.
pub fn summary_path(report: &Path) -> PathBuf {
    report.with_extension("summary.json")
}

#[derive(Serialize)]
struct RunSummary<'a> {
    generated_at: DateTime<Utc>,
    mode: EvalMode,
    dataset: &'a Path,
    report: &'a Path,
    skipped_rows: usize,
    duration_secs: f64,
    metrics: &'a AggregateMetrics,
}

/// Write aggregate metrics as pretty JSON.
pub fn write_summary(
    path: &Path,
    dataset_path: &Path,
    report_path: &Path,
    dataset: &GoldenDataset,
    run: &EvaluationRun,
) -> Result<()> {
    let summary = RunSummary {
        generated_at: Utc::now(),
        mode: run.mode,
        dataset: dataset_path,
        report: report_path,
        skipped_rows: dataset.skipped,
        duration_secs: run.duration_secs,
        metrics: &run.metrics,
    };
    let content = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, content).map_err(|e| RagError::io(path, e))
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Console summary lines.
pub fn summary_lines(run: &EvaluationRun) -> Vec<String> {
    let m = &run.metrics;
    let rule = "=".repeat(60);
    let mut lines = vec![
        rule.clone(),
        format!("  RESULTS SUMMARY ({} questions)", m.total),
        rule.clone(),
        format!(
            "  Retrieval accuracy : {}/{} ({:.1}%)",
            m.retrieval_hits,
            m.total,
            percent(m.retrieval_hits, m.total)
        ),
        format!("  Avg keyword score  : {:.1}%", m.mean_keyword_ratio * 100.0),
    ];

    if let Some(passes) = m.judge_passes {
        lines.push(format!(
            "  Judge pass rate    : {}/{} ({:.1}%)",
            passes,
            m.total,
            percent(passes, m.total)
        ));
        if m.judge_errors > 0 {
            lines.push(format!("  Judge errors       : {}", m.judge_errors));
        }
    }

    lines.push(format!(
        "  Perfect answers    : {}/{} ({:.1}%)",
        m.perfect,
        m.total,
        percent(m.perfect, m.total)
    ));
    if m.failed_queries > 0 {
        lines.push(format!("  Failed queries     : {}", m.failed_queries));
    }
    lines.push(format!("  Total time         : {:.1}s", run.duration_secs));
    lines.push(rule);
    lines
}

/// Print summary to stdout.
pub fn print_summary(run: &EvaluationRun, report: &Path) {
    println!();
    for line in summary_lines(run) {
        println!("{}", line);
    }
    println!("  Results saved to {}", report.display());
    println!("  Summary saved to {}", summary_path(report).display());
}
