pub mod corpus;
pub mod memory;
pub mod sqlite;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;
pub use store::{LabelCounts, NewPassage, PassageMatch, VectorIndex};

use crate::analysis::AnalysisError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// SQLite file; defaults to `<data dir>/reference_index.db`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub seed_on_startup: bool,
    /// YAML corpus used instead of the built-in one
    pub seed_path: Option<PathBuf>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            seed_on_startup: true,
            seed_path: None,
        }
    }
}

/// Opens the configured index once at startup.
pub async fn build_index(
    config: &IndexConfig,
    default_path: &Path,
    dimension: usize,
) -> Result<Arc<dyn VectorIndex>, AnalysisError> {
    match config.backend {
        IndexBackend::Memory => Ok(Arc::new(MemoryVectorIndex::new(dimension))),
        IndexBackend::Sqlite => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| default_path.to_path_buf());
            Ok(Arc::new(SqliteVectorIndex::open(path, dimension).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_each_backend() {
        let dir = tempfile::tempdir().unwrap();
        let default_path = dir.path().join("reference_index.db");

        let memory = build_index(
            &IndexConfig {
                backend: IndexBackend::Memory,
                path: None,
            },
            &default_path,
            8,
        )
        .await
        .unwrap();
        assert_eq!(memory.name(), "memory");

        let sqlite = build_index(&IndexConfig::default(), &default_path, 8)
            .await
            .unwrap();
        assert_eq!(sqlite.name(), "sqlite");
        assert_eq!(sqlite.dimension(), 8);
        assert!(default_path.exists());
    }
}
