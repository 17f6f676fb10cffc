use std::cmp::Ordering;
use std::sync::Arc;

use super::error::AnalysisError;
use super::types::{Chunk, RetrievalMatch};
use crate::embedding::Embedder;
use crate::index::VectorIndex;

/// Fetches the reference passages most similar to a chunk.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Returns up to `k` matches, most similar first, ties in insertion order.
    ///
    /// An index holding fewer than `k` passages returns all of them.
    pub async fn retrieve(
        &self,
        chunk: &Chunk,
        k: usize,
    ) -> Result<Vec<RetrievalMatch>, AnalysisError> {
        if k == 0 {
            return Err(AnalysisError::configuration("k must be at least 1"));
        }

        let vector = self.embedder.embed(&chunk.text).await?;
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(AnalysisError::embedding(format!(
                "{} returned a vector of dimension {}, expected {}",
                self.embedder.name(),
                vector.len(),
                expected
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::embedding(format!(
                "{} returned non-finite components",
                self.embedder.name()
            )));
        }

        let mut hits = self.index.query(&vector, k).await?;
        for hit in &mut hits {
            hit.similarity = clamp_similarity(hit.similarity);
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.passage.seq.cmp(&b.passage.seq))
        });
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|hit| RetrievalMatch {
                chunk_index: chunk.index,
                label: hit.passage.label,
                similarity: hit.similarity,
                passage: hit.passage,
            })
            .collect())
    }
}

fn clamp_similarity(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{ComplianceLabel, ReferencePassage};
    use crate::index::{LabelCounts, MemoryVectorIndex, NewPassage, PassageMatch};
    use async_trait::async_trait;

    struct FixedEmbedder {
        vector: Vec<f32>,
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AnalysisError> {
            Ok(self.vector.clone())
        }
    }

    /// Returns canned matches in the order given, regardless of the query.
    struct CannedIndex {
        matches: Vec<PassageMatch>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        fn name(&self) -> &str {
            "canned"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<PassageMatch>, AnalysisError> {
            Ok(self.matches.clone())
        }

        async fn insert(
            &self,
            _passage: NewPassage,
            _embedding: Vec<f32>,
        ) -> Result<ReferencePassage, AnalysisError> {
            Err(AnalysisError::index_unavailable("read-only"))
        }

        async fn count(&self) -> Result<usize, AnalysisError> {
            Ok(self.matches.len())
        }

        async fn label_counts(&self) -> Result<LabelCounts, AnalysisError> {
            Ok(LabelCounts::default())
        }
    }

    fn chunk() -> Chunk {
        Chunk {
            index: 4,
            start: 0,
            end: 5,
            text: "hello".to_string(),
        }
    }

    fn reference(id: &str, seq: u64) -> ReferencePassage {
        ReferencePassage {
            id: id.to_string(),
            text: id.to_string(),
            label: ComplianceLabel::NonCompliant,
            rationale: String::new(),
            source: None,
            seq,
        }
    }

    fn fixed(vector: Vec<f32>, dimension: usize) -> Arc<dyn Embedder> {
        Arc::new(FixedEmbedder { vector, dimension })
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() {
        let index = Arc::new(MemoryVectorIndex::new(2));
        for (id, v) in [("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])] {
            index
                .insert(
                    NewPassage {
                        id: Some(id.to_string()),
                        text: id.to_string(),
                        label: ComplianceLabel::Compliant,
                        rationale: String::new(),
                        source: None,
                    },
                    v,
                )
                .await
                .unwrap();
        }

        let retriever = Retriever::new(fixed(vec![1.0, 0.0], 2), index);
        let matches = retriever.retrieve(&chunk(), 50).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].passage.id, "a");
        assert_eq!(matches[0].chunk_index, 4);
        assert_eq!(matches[0].label, ComplianceLabel::Compliant);
    }

    #[tokio::test]
    async fn results_are_sorted_clamped_and_truncated() {
        let index = Arc::new(CannedIndex {
            matches: vec![
                PassageMatch {
                    passage: reference("low", 0),
                    similarity: -0.4,
                },
                PassageMatch {
                    passage: reference("tie-late", 5),
                    similarity: 0.7,
                },
                PassageMatch {
                    passage: reference("tie-early", 2),
                    similarity: 0.7,
                },
                PassageMatch {
                    passage: reference("over", 9),
                    similarity: 1.2,
                },
            ],
        });
        let retriever = Retriever::new(fixed(vec![1.0, 0.0], 2), index);

        let all = retriever.retrieve(&chunk(), 10).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.passage.id.as_str()).collect();
        assert_eq!(ids, vec!["over", "tie-early", "tie-late", "low"]);
        assert_eq!(all[0].similarity, 1.0);
        assert_eq!(all[3].similarity, 0.0);

        let top = retriever.retrieve(&chunk(), 2).await.unwrap();
        assert_eq!(top.len(), 2);
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_embedding_error() {
        let retriever = Retriever::new(
            fixed(vec![1.0, 0.0, 0.0], 2),
            Arc::new(MemoryVectorIndex::new(2)),
        );
        let err = retriever.retrieve(&chunk(), 3).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(_)));
    }

    #[tokio::test]
    async fn non_finite_vector_is_an_embedding_error() {
        let retriever = Retriever::new(
            fixed(vec![f32::INFINITY, 0.0], 2),
            Arc::new(MemoryVectorIndex::new(2)),
        );
        let err = retriever.retrieve(&chunk(), 3).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(_)));
    }

    #[tokio::test]
    async fn zero_k_is_a_configuration_error() {
        let retriever = Retriever::new(fixed(vec![1.0, 0.0], 2), Arc::new(MemoryVectorIndex::new(2)));
        let err = retriever.retrieve(&chunk(), 0).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }
}
