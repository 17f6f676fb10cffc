//! Data model shared by every stage of the compliance pipeline.
//!
//! Everything here is produced once and never mutated: documents are frozen
//! on submission, chunks and verdicts are derived values, and a
//! `ComplianceReport` is the terminal artifact handed back to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::AnalysisError;
use super::pdf;

/// Source metadata supplied with a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub document_type: Option<String>,
}

/// A document submitted for analysis.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    text: Arc<str>,
    metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let text: String = text.into();
        Self {
            id: id.into(),
            text: Arc::from(text),
            metadata,
        }
    }

    /// Creates a document whose identifier is derived from its content.
    pub fn from_text(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        let text: String = text.into();
        let id = content_id(&text);
        Self::new(id, text, metadata)
    }

    /// Uses the caller's identifier when one is given, otherwise a content id.
    pub fn with_id(
        id: Option<String>,
        text: impl Into<String>,
        metadata: DocumentMetadata,
    ) -> Self {
        match id {
            Some(id) if !id.trim().is_empty() => Self::new(id.trim(), text, metadata),
            _ => Self::from_text(text, metadata),
        }
    }

    /// Builds a document from the text of an uploaded PDF.
    ///
    /// Fails with `DocumentRead` when no text can be extracted.
    pub fn from_pdf(
        id: Option<String>,
        bytes: &[u8],
        metadata: DocumentMetadata,
    ) -> Result<Self, AnalysisError> {
        let text = pdf::extract_text(bytes)?;
        Ok(Self::with_id(id, text, metadata))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Length of the text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Stable identifier for a piece of text: `doc-` plus 16 hex chars of its SHA-256.
pub fn content_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("doc-{}", &hex::encode(digest)[..16])
}

/// An offset-addressed segment of a document.
///
/// `start`/`end` are byte offsets on character boundaries, so
/// `&document.text()[start..end] == text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn span(&self) -> Span {
        Span {
            start: self.start,
            end: self.end,
        }
    }
}

/// Half-open byte range into the parent document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLabel {
    Compliant,
    NonCompliant,
    Neutral,
}

impl ComplianceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::NonCompliant => "non_compliant",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for ComplianceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceLabel {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compliant" => Ok(Self::Compliant),
            "non_compliant" | "non-compliant" => Ok(Self::NonCompliant),
            "neutral" => Ok(Self::Neutral),
            other => Err(AnalysisError::configuration(format!(
                "unknown compliance label '{}'",
                other
            ))),
        }
    }
}

/// A labelled entry of the reference corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePassage {
    pub id: String,
    pub text: String,
    pub label: ComplianceLabel,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Insertion order inside the index; breaks similarity ties.
    pub seq: u64,
}

/// A reference passage retrieved for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub chunk_index: usize,
    pub passage: ReferencePassage,
    pub similarity: f32,
    pub label: ComplianceLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Violation,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Violation => "violation",
        }
    }
}

/// A deterministic pattern-rule hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub chunk_index: usize,
    pub rule_id: String,
    pub severity: Severity,
    /// Document offsets of the matched text.
    pub span: Span,
    pub matched: String,
    pub explanation: String,
}

/// Risk-disclosure language found in a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosureMatch {
    pub chunk_index: usize,
    pub disclosure_id: String,
    pub span: Span,
    pub matched: String,
}

/// Structured notes attached to a chunk verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkAnnotation {
    RetrievalUnavailable { reason: String, attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    Compliant,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkVerdict {
    pub chunk: Chunk,
    pub score: f32,
    pub rule_weight: f32,
    pub retrieval_weight: f32,
    pub label: VerdictLabel,
    pub findings: Vec<RuleFinding>,
    pub evidence: Vec<RetrievalMatch>,
    pub disclosures: Vec<DisclosureMatch>,
    pub annotations: Vec<ChunkAnnotation>,
}

impl ChunkVerdict {
    pub fn is_flagged(&self) -> bool {
        self.label == VerdictLabel::Flagged
    }

    pub fn has_violation(&self) -> bool {
        self.findings
            .iter()
            .any(|finding| finding.severity == Severity::Violation)
    }

    pub fn retrieval_unavailable(&self) -> bool {
        self.annotations
            .iter()
            .any(|note| matches!(note, ChunkAnnotation::RetrievalUnavailable { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLabel {
    Compliant,
    Flagged,
    NonCompliant,
}

impl DocumentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Flagged => "flagged",
            Self::NonCompliant => "non_compliant",
        }
    }
}

impl fmt::Display for DocumentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The document-level result of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub document_id: String,
    pub title: Option<String>,
    pub document_type: String,
    pub overall_score: f32,
    pub overall_label: DocumentLabel,
    pub chunks: Vec<ChunkVerdict>,
    pub degraded_chunks: usize,
    pub financial_terms: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub fn flagged_chunks(&self) -> impl Iterator<Item = &ChunkVerdict> {
        self.chunks.iter().filter(|verdict| verdict.is_flagged())
    }

    pub fn findings(&self) -> impl Iterator<Item = &RuleFinding> {
        self.chunks.iter().flat_map(|verdict| verdict.findings.iter())
    }

    pub fn violations(&self) -> impl Iterator<Item = &RuleFinding> {
        self.findings()
            .filter(|finding| finding.severity == Severity::Violation)
    }
}
