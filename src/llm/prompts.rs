//! Prompt templates for answer synthesis and semantic judging.

use crate::config::PromptStyle;

/// Sentence the improved prompt asks the model to use when the context is insufficient.
pub const NO_INFORMATION_REPLY: &str = "Dazu liegen mir keine Informationen vor.";

/// Collection of prompts used by the query service and the judge.
pub struct Prompts;

impl Prompts {
    /// Answer prompt with `{context_str}` and `{query_str}` placeholders.
    pub fn answer_template(style: PromptStyle) -> &'static str {
        match style {
            PromptStyle::Baseline => {
                "Beantworte die Frage basierend auf dem bereitgestellten Kontext.\n\
\n\
Kontext:\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Frage: {query_str}\n\
Antwort: "
            }
            PromptStyle::Improved => {
                "Du bist ein hilfreicher Assistent fuer CloudBase. \
Beantworte die Frage ausschliesslich anhand des bereitgestellten Kontexts.\n\
\n\
Regeln:\n\
- Antworte immer auf {language}.\n\
- Wenn der Kontext die Antwort nicht enthaelt, sage klar: \"{no_information}\"\n\
- Erfinde niemals Informationen, die nicht im Kontext stehen.\n\
- Nenne alle relevanten Zahlen, Preise, Daten, Fristen und Status-Angaben (z.B. Beta) vollstaendig.\n\
- Wenn eine Einschraenkung existiert, erklaere auch, wer die Berechtigung stattdessen hat.\n\
\n\
Kontext:\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Frage: {query_str}\n\
Antwort: "
            }
        }
    }

    /// Fill the answer template. Context is embedded verbatim.
    pub fn render_answer(style: PromptStyle, language: &str, context: &str, query: &str) -> String {
        // Context last: retrieved text may itself contain brace placeholders.
        Self::answer_template(style)
            .replace("{language}", language)
            .replace("{no_information}", NO_INFORMATION_REPLY)
            .replace("{query_str}", query)
            .replace("{context_str}", context)
    }

    /// System prompt for the semantic-equivalence judge.
    pub fn judge_system() -> &'static str {
        r#"Du bist ein strenger Evaluator fuer ein RAG-System ueber das Produkt "CloudBase".
Deine Aufgabe: Pruefe, ob die tatsaechliche Antwort semantisch aequivalent zur erwarteten Antwort ist.

Regeln:
- Unterschiedliche Formulierungen sind OK, solange der Inhalt stimmt.
  Beispiel: "49Euro" und "49 Euro" sind gleichwertig.
- Alle wesentlichen Fakten (Zahlen, Namen, Daten, Fristen, Einschraenkungen) muessen in der tatsaechlichen Antwort enthalten sein.
- Bei Verweigerungsfragen (erwartete Antwort enthaelt "Keine Information verfuegbar" oder aehnlich): Die tatsaechliche Antwort muss klar ablehnen, eine Antwort zu geben. Jede Formulierung der Verweigerung zaehlt als korrekt.
- Wenn die tatsaechliche Antwort korrekte Informationen enthaelt, aber wesentliche Fakten aus der erwarteten Antwort fehlen, antworte mit NO.
- Wenn die tatsaechliche Antwort Informationen halluziniert, die nicht in der erwarteten Antwort stehen, antworte mit NO.

Antworte ausschliesslich als JSON (kein Markdown, keine Codebloecke):
{"verdict": "YES" oder "NO", "reason": "kurze Begruendung auf Deutsch"}"#
    }

    /// User message for one judge call.
    pub fn judge_user(question: &str, expected: &str, actual: &str, rationale: &str) -> String {
        format!(
            "Frage: {}\nErwartete Antwort: {}\nTatsaechliche Antwort: {}\nTestgrund: {}",
            question, expected, actual, rationale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::answer_template(PromptStyle::Baseline).is_empty());
        assert!(!Prompts::answer_template(PromptStyle::Improved).is_empty());
        assert!(Prompts::judge_system().contains("\"verdict\""));
    }

    #[test]
    fn test_improved_prompt_carries_rules() {
        let prompt = Prompts::render_answer(
            PromptStyle::Improved,
            "Deutsch",
            "Der Pro-Plan kostet 49 Euro.",
            "Was kostet Pro?",
        );
        assert!(prompt.contains("Antworte immer auf Deutsch."));
        assert!(prompt.contains(NO_INFORMATION_REPLY));
        assert!(prompt.contains("ausschliesslich anhand des bereitgestellten Kontexts"));
        assert!(prompt.contains("Der Pro-Plan kostet 49 Euro."));
        assert!(prompt.ends_with("Frage: Was kostet Pro?\nAntwort: "));
    }

    #[test]
    fn test_context_is_embedded_verbatim() {
        let context = "Preis: {query_str} bleibt {context_str}";
        let prompt = Prompts::render_answer(PromptStyle::Baseline, "Deutsch", context, "Q?");
        assert!(prompt.contains(context));
        assert!(prompt.contains("Frage: Q?"));
    }

    #[test]
    fn test_judge_user_message() {
        let msg = Prompts::judge_user("F", "E", "T", "W");
        assert_eq!(
            msg,
            "Frage: F\nErwartete Antwort: E\nTatsaechliche Antwort: T\nTestgrund: W"
        );
    }
}
