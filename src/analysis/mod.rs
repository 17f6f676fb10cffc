//! Document compliance-analysis pipeline.
//!
//! Chunker -> (Retriever || RuleScorer) -> Aggregator, driven by
//! `ComplianceService`.

pub mod aggregator;
pub mod chunker;
pub mod config;
pub mod error;
pub mod pdf;
pub mod profile;
pub mod retriever;
pub mod rules;
pub mod service;
pub mod types;


pub use aggregator::{Aggregator, Retrieval};
pub use chunker::{chunk, Chunker, Chunks};
pub use config::{AnalysisConfig, AnalysisOverrides, SeverityWeights};
pub use error::AnalysisError;
pub use profile::{extract_financial_terms, identify_document_type, DocumentType};
pub use retriever::Retriever;
pub use rules::{RuleCatalog, RuleOutcome, RuleScope, RuleScorer};
pub use service::ComplianceService;
pub use types::{
    content_id, Chunk, ChunkAnnotation, ChunkVerdict, ComplianceLabel, ComplianceReport,
    DisclosureMatch, Document, DocumentLabel, DocumentMetadata, ReferencePassage, RetrievalMatch,
    RuleFinding, Severity, Span, VerdictLabel,
};
