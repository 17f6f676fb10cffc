use thiserror::Error;

/// Errors raised by the compliance-analysis pipeline.
///
/// `Configuration` and `DocumentRead` abort an analysis before any chunk is
/// processed. `Embedding` and `IndexUnavailable` are per-chunk: the
/// orchestrator retries them and then degrades the chunk to rule-only scoring.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("document read error: {0}")]
    DocumentRead(String),
}

impl AnalysisError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        Self::Embedding(err.to_string())
    }

    pub fn index_unavailable<E: std::fmt::Display>(err: E) -> Self {
        Self::IndexUnavailable(err.to_string())
    }

    pub fn document_read(message: impl Into<String>) -> Self {
        Self::DocumentRead(message.into())
    }

    /// Whether the orchestrator may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::IndexUnavailable(_))
    }

    /// Whether this error aborts a whole analysis.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::DocumentRead(_))
    }
}
