//! Retrieval scoring against the expected source documents.

/// Dataset marker meaning no particular source is required.
pub const NO_SOURCE_SENTINEL: &str = "KEINE";

/// Parsed `erwartetes_dokument` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedSources {
    /// Any retrieval result is acceptable, including none.
    NotRequired,
    /// At least one of these basenames must be retrieved.
    AnyOf(Vec<String>),
}

impl ExpectedSources {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case(NO_SOURCE_SENTINEL) {
            return Self::NotRequired;
        }

        Self::AnyOf(
            spec.split('|')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// OR semantics: one matching source is enough.
    pub fn is_satisfied_by(&self, retrieved: &[String]) -> bool {
        match self {
            Self::NotRequired => true,
            Self::AnyOf(expected) => expected.iter().any(|name| retrieved.contains(name)),
        }
    }
}

/// Whether the retrieved basenames satisfy `spec`.
pub fn retrieval_hit(spec: &str, retrieved: &[String]) -> bool {
    ExpectedSources::parse(spec).is_satisfied_by(retrieved)
}
