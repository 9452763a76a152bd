//! Hierarchical answer synthesis.
//!
//! Evidence that fits one prompt is answered in a single call. Otherwise the
//! evidence is packed into prompt-sized groups, each group is answered on its
//! own, and the partial answers become the evidence of the next round until a
//! single group remains.

use crate::config::PromptStyle;
use crate::error::{RagError, Result};
use crate::llm::{Prompts, Sampling, TextGenerator};
use futures::future::try_join_all;
use tracing::debug;

/// Upper bound on summarization rounds.
const MAX_ROUNDS: usize = 8;

/// Smallest context budget ever used, in tokens.
const MIN_CONTEXT_BUDGET: usize = 32;

/// Separator between evidence texts inside one prompt.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Estimate token count from text (rough approximation: words / 0.75).
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 / 0.75) as usize
}

/// Tree summarizer over one generator.
pub struct TreeSummarizer<'a> {
    generator: &'a dyn TextGenerator,
    style: PromptStyle,
    language: &'a str,
    context_window: usize,
}

impl<'a> TreeSummarizer<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        style: PromptStyle,
        language: &'a str,
        context_window: usize,
    ) -> Self {
        Self {
            generator,
            style,
            language,
            context_window,
        }
    }

    /// Answer `query` from `evidence`, preserving every piece of evidence.
    pub async fn summarize(&self, query: &str, evidence: Vec<String>) -> Result<String> {
        let budget = self.context_budget(query);
        let mut texts = split_oversized(evidence, budget);

        for round in 0..MAX_ROUNDS {
            let mut groups = pack(&texts, budget);
            if groups.len() <= 1 {
                let context = groups.pop().unwrap_or_default();
                return self.answer(query, &context).await;
            }

            debug!(round, groups = groups.len(), "Summarizing evidence groups");
            let partials = try_join_all(groups.iter().map(|ctx| self.answer(query, ctx))).await?;
            texts = split_oversized(partials, budget);
        }

        Err(RagError::LlmApi(format!(
            "Evidence could not be reduced to one prompt within {} rounds",
            MAX_ROUNDS
        )))
    }

    async fn answer(&self, query: &str, context: &str) -> Result<String> {
        let prompt = Prompts::render_answer(self.style, self.language, context, query);
        let reply = self
            .generator
            .complete(None, &prompt, Sampling::default())
            .await?;
        Ok(reply.trim().to_string())
    }

    /// Tokens left for evidence once the template and question are accounted for.
    fn context_budget(&self, query: &str) -> usize {
        let overhead = estimate_tokens(&Prompts::render_answer(
            self.style,
            self.language,
            "",
            query,
        ));
        self.context_window
            .saturating_sub(overhead)
            .max(MIN_CONTEXT_BUDGET)
    }
}

/// Greedily pack texts, in order, into groups whose estimate stays within `budget`.
fn pack(texts: &[String], budget: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut used = 0;

    for text in texts {
        let cost = estimate_tokens(text);
        if !current.is_empty() && used + cost > budget {
            groups.push(current.join(CONTEXT_SEPARATOR));
            current.clear();
            used = 0;
        }
        current.push(text);
        used += cost;
    }

    if !current.is_empty() {
        groups.push(current.join(CONTEXT_SEPARATOR));
    }
    groups
}

/// Split any text whose estimate exceeds `budget` into word-bounded pieces.
fn split_oversized(texts: Vec<String>, budget: usize) -> Vec<String> {
    let max_words = (budget * 3 / 4).max(1);

    texts
        .into_iter()
        .flat_map(|text| {
            if estimate_tokens(&text) <= budget {
                return vec![text];
            }
            let words: Vec<&str> = text.split_whitespace().collect();
            words
                .chunks(max_words)
                .map(|piece| piece.join(" "))
                .collect()
        })
        .collect()
}
