use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize embedder: {0}")]
    Embedder(#[source] anyhow::Error),

    #[error("Failed to open reference index: {0}")]
    Index(#[source] anyhow::Error),

    #[error("Failed to seed reference corpus: {0}")]
    Corpus(#[source] anyhow::Error),

    #[error("Failed to load rule catalog: {0}")]
    Rules(#[source] anyhow::Error),

    #[error("Failed to build compliance service: {0}")]
    Service(#[source] anyhow::Error),
}
