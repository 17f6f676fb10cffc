//! VectorIndex trait: the nearest-neighbour contract the pipeline depends on.
//!
//! The analysis pipeline only ever calls `query`. `insert`, `count` and
//! `label_counts` exist for corpus ingestion and statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::{AnalysisError, ComplianceLabel, ReferencePassage};

/// A passage submitted for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPassage {
    /// Derived from the text when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    pub label: ComplianceLabel,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl NewPassage {
    pub fn resolved_id(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => passage_id(&self.text),
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.text.trim().is_empty() {
            return Err(AnalysisError::configuration("passage text must not be empty"));
        }
        Ok(())
    }
}

/// `ref-` plus 16 hex chars of the text's SHA-256.
pub fn passage_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("ref-{}", &hex::encode(digest)[..16])
}

/// Result of a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageMatch {
    pub passage: ReferencePassage,
    /// Cosine similarity (higher = closer).
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub compliant: usize,
    pub non_compliant: usize,
    pub neutral: usize,
}

impl LabelCounts {
    pub fn add(&mut self, label: ComplianceLabel, n: usize) {
        match label {
            ComplianceLabel::Compliant => self.compliant += n,
            ComplianceLabel::NonCompliant => self.non_compliant += n,
            ComplianceLabel::Neutral => self.neutral += n,
        }
    }

    pub fn total(&self) -> usize {
        self.compliant + self.non_compliant + self.neutral
    }
}

/// Abstract nearest-neighbour store over labelled reference passages.
///
/// Implementations must return matches ordered by descending similarity,
/// breaking ties by insertion order, and at most `k` of them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// backend name (e.g. "memory", "sqlite")
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<PassageMatch>, AnalysisError>;

    /// Inserts or replaces (by id) one passage. A replaced passage keeps its sequence number.
    async fn insert(
        &self,
        passage: NewPassage,
        embedding: Vec<f32>,
    ) -> Result<ReferencePassage, AnalysisError>;

    async fn insert_batch(
        &self,
        items: Vec<(NewPassage, Vec<f32>)>,
    ) -> Result<Vec<ReferencePassage>, AnalysisError> {
        let mut stored = Vec::with_capacity(items.len());
        for (passage, embedding) in items {
            stored.push(self.insert(passage, embedding).await?);
        }
        Ok(stored)
    }

    async fn count(&self) -> Result<usize, AnalysisError>;

    async fn label_counts(&self) -> Result<LabelCounts, AnalysisError>;
}

pub(crate) fn check_dimension(expected: usize, embedding: &[f32]) -> Result<(), AnalysisError> {
    if embedding.len() != expected {
        return Err(AnalysisError::configuration(format!(
            "embedding dimension {} does not match index dimension {}",
            embedding.len(),
            expected
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::configuration(
            "embedding contains non-finite components",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passage_ids_are_derived_from_text() {
        let passage = NewPassage {
            id: None,
            text: "Returns are not guaranteed.".to_string(),
            label: ComplianceLabel::Compliant,
            rationale: String::new(),
            source: None,
        };
        let id = passage.resolved_id();
        assert!(id.starts_with("ref-"));
        assert_eq!(id, passage_id("Returns are not guaranteed."));

        let named = NewPassage {
            id: Some(" finra-2210 ".to_string()),
            ..passage
        };
        assert_eq!(named.resolved_id(), "finra-2210");
    }

    #[test]
    fn label_counts_total() {
        let mut counts = LabelCounts::default();
        counts.add(ComplianceLabel::Compliant, 2);
        counts.add(ComplianceLabel::NonCompliant, 3);
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.neutral, 0);
    }

    #[test]
    fn dimension_check_rejects_mismatch_and_nan() {
        assert!(check_dimension(3, &[0.0, 1.0, 0.0]).is_ok());
        assert!(check_dimension(3, &[0.0, 1.0]).is_err());
        assert!(check_dimension(2, &[f32::NAN, 1.0]).is_err());
    }
}
