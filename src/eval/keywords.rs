//! Lexical keyword coverage of an answer.

use serde::Serialize;

/// Keyword coverage of one answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordMatch {
    pub found: Vec<String>,
    pub missing: Vec<String>,
    /// `found / expected`, or 1.0 when nothing was expected.
    pub ratio: f64,
}

impl KeywordMatch {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn expected(&self) -> usize {
        self.found.len() + self.missing.len()
    }
}

/// Split a comma-separated keyword list, dropping empty entries.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring check of each expected keyword, in input order.
pub fn score_keywords(expected: &str, answer: &str) -> KeywordMatch {
    let answer = answer.to_lowercase();
    let (found, missing): (Vec<String>, Vec<String>) = parse_keywords(expected)
        .into_iter()
        .partition(|kw| answer.contains(&kw.to_lowercase()));

    let total = found.len() + missing.len();
    let ratio = if total == 0 {
        1.0
    } else {
        found.len() as f64 / total as f64
    };

    KeywordMatch {
        found,
        missing,
        ratio,
    }
}
