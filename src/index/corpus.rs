//! Reference-corpus loading and ingestion.

use std::path::Path;

use serde::Deserialize;

use super::store::{NewPassage, VectorIndex};
use crate::analysis::{AnalysisError, ReferencePassage};
use crate::embedding::Embedder;

const BUILTIN_CORPUS: &str = include_str!("reference_corpus.yml");

#[derive(Debug, Deserialize)]
struct CorpusFile {
    passages: Vec<NewPassage>,
}

pub fn builtin_corpus() -> Result<Vec<NewPassage>, AnalysisError> {
    parse_corpus(BUILTIN_CORPUS)
}

pub fn load_corpus(path: &Path) -> Result<Vec<NewPassage>, AnalysisError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AnalysisError::configuration(format!(
            "failed to read reference corpus {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_corpus(&content)
}

fn parse_corpus(content: &str) -> Result<Vec<NewPassage>, AnalysisError> {
    let file: CorpusFile = serde_yaml::from_str(content)
        .map_err(|e| AnalysisError::configuration(format!("invalid reference corpus: {}", e)))?;
    for passage in &file.passages {
        passage.validate()?;
    }
    Ok(file.passages)
}

/// Embeds and indexes `passages`, returning them as stored.
pub async fn ingest(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    passages: Vec<NewPassage>,
) -> Result<Vec<ReferencePassage>, AnalysisError> {
    if passages.is_empty() {
        return Ok(Vec::new());
    }
    for passage in &passages {
        passage.validate()?;
    }
    if embedder.dimension() != index.dimension() {
        return Err(AnalysisError::configuration(format!(
            "embedder dimension {} does not match index dimension {}",
            embedder.dimension(),
            index.dimension()
        )));
    }

    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != passages.len() {
        return Err(AnalysisError::embedding(format!(
            "expected {} embeddings, got {}",
            passages.len(),
            embeddings.len()
        )));
    }

    index
        .insert_batch(passages.into_iter().zip(embeddings).collect())
        .await
}

/// Seeds an empty index with the configured corpus (or the built-in one).
///
/// Returns the number of passages inserted; a populated index is left alone.
pub async fn seed_if_empty(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    seed_path: Option<&Path>,
) -> Result<usize, AnalysisError> {
    let existing = index.count().await?;
    if existing > 0 {
        tracing::info!("Reference index already holds {} passages; skipping seed", existing);
        return Ok(0);
    }

    let passages = match seed_path {
        Some(path) => load_corpus(path)?,
        None => builtin_corpus()?,
    };
    let stored = ingest(embedder, index, passages).await?;
    tracing::info!(
        "Seeded reference index '{}' with {} passages",
        index.name(),
        stored.len()
    );
    Ok(stored.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ComplianceLabel;
    use crate::embedding::HashingEmbedder;
    use crate::index::MemoryVectorIndex;

    #[test]
    fn builtin_corpus_has_every_label() {
        let corpus = builtin_corpus().unwrap();
        for label in [
            ComplianceLabel::Compliant,
            ComplianceLabel::NonCompliant,
            ComplianceLabel::Neutral,
        ] {
            assert!(corpus.iter().any(|p| p.label == label), "missing {}", label);
        }
    }

    #[tokio::test]
    async fn seed_only_runs_on_an_empty_index() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let index = MemoryVectorIndex::new(64);

        let seeded = seed_if_empty(&embedder, &index, None).await.unwrap();
        assert_eq!(seeded, builtin_corpus().unwrap().len());
        assert_eq!(seed_if_empty(&embedder, &index, None).await.unwrap(), 0);
        assert_eq!(index.count().await.unwrap(), seeded);
    }

    #[tokio::test]
    async fn seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.yml");
        std::fs::write(
            &path,
            "passages:\n  - text: \"Returns are not guaranteed.\"\n    label: compliant\n",
        )
        .unwrap();

        let embedder = HashingEmbedder::new(32).unwrap();
        let index = MemoryVectorIndex::new(32);
        assert_eq!(seed_if_empty(&embedder, &index, Some(&path)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_configuration_error() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let index = MemoryVectorIndex::new(32);
        let err = ingest(&embedder, &index, builtin_corpus().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }
}
