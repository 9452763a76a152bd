//! LLM-as-judge semantic equivalence scoring.

use crate::error::{RagError, Result};
use crate::llm::{Prompts, Sampling, TextGenerator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Reason recorded when the question could not be answered at all.
pub const QUERY_FAILED_REASON: &str = "RAG query failed";

/// Judge decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Yes,
    No,
    /// The reply could not be read as a verdict. Never a pass.
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Verdict plus the judge's justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub verdict: Verdict,
    pub reason: String,
}

impl JudgeVerdict {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            reason: reason.into(),
        }
    }

    /// Recorded without calling the judge when the question itself failed.
    pub fn query_failed() -> Self {
        Self {
            verdict: Verdict::No,
            reason: QUERY_FAILED_REASON.to_string(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Yes
    }
}

/// Remove a triple-backtick fence wrapped around the whole reply.
///
/// Tolerates surrounding whitespace and a language tag after the opening
/// fence. Fences inside the payload are left alone.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) if rest[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[newline + 1..]
            }
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
        text = text.trim_end();
        if let Some(body) = text.strip_suffix("```") {
            text = body;
        }
    }

    text.trim()
}

#[derive(Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    reason: String,
}

/// Parse a judge reply into a verdict.
///
/// A well-formed object with an unknown verdict value becomes `ERROR`.
pub fn parse_verdict(raw: &str) -> Result<JudgeVerdict> {
    let text = strip_code_fences(raw);

    let parsed: RawVerdict = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(_) => extract_object(text)
            .and_then(|object| serde_json::from_str(object).ok())
            .ok_or_else(|| {
                RagError::JudgeParse(format!("Judge returned invalid JSON: {}", raw.trim()))
            })?,
    };

    let verdict = match parsed.verdict.trim().to_uppercase().as_str() {
        "YES" => Verdict::Yes,
        "NO" => Verdict::No,
        other => {
            return Ok(JudgeVerdict::error(format!(
                "Judge returned unknown verdict '{}': {}",
                other, parsed.reason
            )));
        }
    };

    Ok(JudgeVerdict {
        verdict,
        reason: parsed.reason,
    })
}

/// The outermost `{...}` span, for replies with prose around the object.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Semantic judge backed by a Generation Service.
pub struct SemanticJudge {
    generator: Arc<dyn TextGenerator>,
}

impl SemanticJudge {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Judge whether `actual` is equivalent to `expected`.
    ///
    /// Never fails: unreadable replies and generation failures both yield `ERROR`.
    pub async fn judge(
        &self,
        question: &str,
        expected: &str,
        actual: &str,
        rationale: &str,
    ) -> JudgeVerdict {
        let user = Prompts::judge_user(question, expected, actual, rationale);
        let reply = match self
            .generator
            .complete(Some(Prompts::judge_system()), &user, Sampling::deterministic())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Judge call failed");
                return JudgeVerdict::error(format!("Judge call failed: {}", e));
            }
        };

        match parse_verdict(&reply) {
            Ok(verdict) => verdict,
            Err(RagError::JudgeParse(reason)) => {
                warn!(reply = %reply, "Judge reply was not valid JSON");
                JudgeVerdict::error(reason)
            }
            Err(e) => JudgeVerdict::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockGenerator;

    const YES: &str = r#"{"verdict":"YES","reason":"ok"}"#;

    #[test]
    fn test_plain_json() {
        let v = parse_verdict(YES).unwrap();
        assert_eq!(v.verdict, Verdict::Yes);
        assert_eq!(v.reason, "ok");
        assert!(v.passed());
    }

    #[test]
    fn test_fenced_json_parses_identically() {
        let plain = parse_verdict(YES).unwrap();
        for wrapped in [
            format!("```json\n{}\n```", YES),
            format!("```\n{}\n```", YES),
            format!("  \n```json\n{}\n```  \n", YES),
            format!("```{}```", YES),
            format!("```json{}```", YES),
        ] {
            assert_eq!(parse_verdict(&wrapped).unwrap(), plain, "{}", wrapped);
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("   {}   "), "{}");
        assert_eq!(strip_code_fences("```\n{\"a\": \"```\"}\n```"), "{\"a\": \"```\"}");
        assert_eq!(strip_code_fences("kein json"), "kein json");
    }

    #[test]
    fn test_non_json_is_parse_error() {
        let err = parse_verdict("Die Antwort ist korrekt.").unwrap_err();
        assert_eq!(err.kind(), "judge_parse");
        assert!(err.to_string().contains("Judge returned invalid JSON: Die Antwort ist korrekt."));
    }

    #[test]
    fn test_prose_around_object() {
        let raw = r#"Hier mein Urteil: {"verdict": "no", "reason": "Preis fehlt"} Danke."#;
        let v = parse_verdict(raw).unwrap();
        assert_eq!(v.verdict, Verdict::No);
        assert_eq!(v.reason, "Preis fehlt");
    }

    #[test]
    fn test_unknown_verdict_is_error() {
        let v = parse_verdict(r#"{"verdict": "MAYBE", "reason": "unklar"}"#).unwrap();
        assert_eq!(v.verdict, Verdict::Error);
        assert!(!v.passed());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Yes.to_string(), "YES");
        assert_eq!(Verdict::Error.to_string(), "ERROR");
        assert_eq!(JudgeVerdict::query_failed().reason, "RAG query failed");
    }

    #[tokio::test]
    async fn test_judge_uses_deterministic_sampling() {
        let generator = Arc::new(MockGenerator::replying(YES));
        let judge = SemanticJudge::new(generator.clone());

        let v = judge
            .judge("Was kostet Pro?", "49 Euro", "Pro kostet 49 Euro.", "Preis")
            .await;

        assert_eq!(v.verdict, Verdict::Yes);
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sampling, Sampling::deterministic());
        assert!(calls[0].system.as_deref().unwrap_or_default().contains("\"verdict\""));
        assert!(calls[0].user.contains("Tatsaechliche Antwort: Pro kostet 49 Euro."));
    }

    #[tokio::test]
    async fn test_judge_invalid_reply_is_error_with_raw_text() {
        let judge = SemanticJudge::new(Arc::new(MockGenerator::replying("Ja, passt.")));
        let v = judge.judge("F", "E", "A", "W").await;
        assert_eq!(v.verdict, Verdict::Error);
        assert!(v.reason.contains("Ja, passt."));
        assert!(!v.passed());
    }

    #[tokio::test]
    async fn test_judge_generation_failure_is_error() {
        let judge = SemanticJudge::new(Arc::new(MockGenerator::failing("rate limited")));
        let v = judge.judge("F", "E", "A", "W").await;
        assert_eq!(v.verdict, Verdict::Error);
        assert!(v.reason.contains("rate limited"));
    }
}
