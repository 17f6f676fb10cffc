//! In-process vector index with brute-force cosine search.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{check_dimension, LabelCounts, NewPassage, PassageMatch, VectorIndex};
use crate::analysis::{AnalysisError, ReferencePassage};
use crate::vector_math;

#[derive(Default)]
struct Entries {
    passages: Vec<ReferencePassage>,
    embeddings: Vec<Vec<f32>>,
    next_seq: u64,
}

pub struct MemoryVectorIndex {
    dimension: usize,
    entries: RwLock<Entries>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Entries::default()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<PassageMatch>, AnalysisError> {
        let entries = self.entries.read().await;
        if entries.passages.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // passages are kept in sequence order, and the ranking is stable
        let ranked = vector_math::rank_descending_by_cosine(vector, &entries.embeddings)?;
        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(idx, similarity)| PassageMatch {
                passage: entries.passages[idx].clone(),
                similarity,
            })
            .collect())
    }

    async fn insert(
        &self,
        passage: NewPassage,
        embedding: Vec<f32>,
    ) -> Result<ReferencePassage, AnalysisError> {
        passage.validate()?;
        check_dimension(self.dimension, &embedding)?;

        let id = passage.resolved_id();
        let mut entries = self.entries.write().await;

        if let Some(pos) = entries.passages.iter().position(|p| p.id == id) {
            let seq = entries.passages[pos].seq;
            let stored = ReferencePassage {
                id,
                text: passage.text,
                label: passage.label,
                rationale: passage.rationale,
                source: passage.source,
                seq,
            };
            entries.passages[pos] = stored.clone();
            entries.embeddings[pos] = embedding;
            return Ok(stored);
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        let stored = ReferencePassage {
            id,
            text: passage.text,
            label: passage.label,
            rationale: passage.rationale,
            source: passage.source,
            seq,
        };
        entries.passages.push(stored.clone());
        entries.embeddings.push(embedding);
        Ok(stored)
    }

    async fn count(&self) -> Result<usize, AnalysisError> {
        Ok(self.entries.read().await.passages.len())
    }

    async fn label_counts(&self) -> Result<LabelCounts, AnalysisError> {
        let entries = self.entries.read().await;
        let mut counts = LabelCounts::default();
        for passage in &entries.passages {
            counts.add(passage.label, 1);
        }
        Ok(counts)
    }
}
