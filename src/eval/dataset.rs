//! Golden dataset loading.
//!
//! The dataset is a semicolon-delimited CSV with a header row. Required
//! columns: `frage`, `erwartete_antwort`, `erwartetes_dokument`. Optional:
//! `warum`, `erwartete_keywords`. Any other columns are carried through to the
//! report unchanged.

use crate::error::{RagError, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub const COL_QUESTION: &str = "frage";
pub const COL_RATIONALE: &str = "warum";
pub const COL_EXPECTED_ANSWER: &str = "erwartete_antwort";
pub const COL_EXPECTED_DOCUMENT: &str = "erwartetes_dokument";
pub const COL_EXPECTED_KEYWORDS: &str = "erwartete_keywords";

const REQUIRED_COLUMNS: &[&str] = &[COL_QUESTION, COL_EXPECTED_ANSWER, COL_EXPECTED_DOCUMENT];

/// One curated question with its expectations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoldenQuestion {
    pub question: String,
    /// Why the question is in the set; handed to the judge.
    pub rationale: String,
    pub expected_answer: String,
    /// `KEINE` or a `|`-separated set of filenames.
    pub expected_document_spec: String,
    /// Comma-separated keywords; empty when the column is absent.
    pub expected_keywords: String,
    /// Original cell values, aligned with [`GoldenDataset::headers`].
    pub row: Vec<String>,
}

/// Ordered golden dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoldenDataset {
    pub headers: Vec<String>,
    pub questions: Vec<GoldenQuestion>,
    /// Rows dropped because their question was blank.
    pub skipped: usize,
}

impl GoldenDataset {
    /// Load from a CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RagError::io(path, e))?;
        Self::from_reader(file).map_err(|e| match e {
            RagError::Dataset(msg) => RagError::Dataset(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse CSV data from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| RagError::Dataset(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        for required in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == required) {
                return Err(RagError::Dataset(format!(
                    "missing required column '{}'",
                    required
                )));
            }
        }

        let column = |name: &str| headers.iter().position(|h| h == name);
        let question_col = column(COL_QUESTION);
        let answer_col = column(COL_EXPECTED_ANSWER);
        let document_col = column(COL_EXPECTED_DOCUMENT);
        let rationale_col = column(COL_RATIONALE);
        let keywords_col = column(COL_EXPECTED_KEYWORDS);

        let mut dataset = GoldenDataset {
            headers: headers.clone(),
            ..Default::default()
        };

        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| RagError::Dataset(format!("row {}: {}", line + 1, e)))?;
            let row: Vec<String> = (0..headers.len())
                .map(|i| record.get(i).unwrap_or_default().to_string())
                .collect();
            let cell = |col: Option<usize>| col.map(|i| row[i].clone()).unwrap_or_default();

            let question = cell(question_col).trim().to_string();
            if question.is_empty() {
                debug!(row = line + 1, "Skipping row without question");
                dataset.skipped += 1;
                continue;
            }

            dataset.questions.push(GoldenQuestion {
                question,
                rationale: cell(rationale_col),
                expected_answer: cell(answer_col),
                expected_document_spec: cell(document_col),
                expected_keywords: cell(keywords_col),
                row,
            });
        }

        Ok(dataset)
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Check if dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Get a subset of questions (for quick testing).
    pub fn take(&self, n: usize) -> Self {
        Self {
            headers: self.headers.clone(),
            questions: self.questions.iter().take(n).cloned().collect(),
            skipped: self.skipped,
        }
    }
}
