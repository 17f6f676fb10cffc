//! Combines rule findings and retrieval evidence into verdicts.
//!
//! Per chunk: `score = max(rule_weight, retrieval_weight)` where the rule
//! weight is the heaviest finding's severity weight and the retrieval weight
//! is the similarity mass of non-compliant neighbours averaged over all
//! neighbours, discounted when the chunk carries disclosure language.
//! Per document: mean chunk score, escalated to `non_compliant` when any
//! flagged chunk holds a violation.

use std::sync::Arc;

use chrono::Utc;

use super::config::{AnalysisConfig, SeverityWeights};
use super::profile::{extract_financial_terms, identify_document_type};
use super::rules::{RuleCatalog, RuleOutcome};
use super::types::{
    Chunk, ChunkAnnotation, ChunkVerdict, ComplianceLabel, ComplianceReport, Document,
    DocumentLabel, RetrievalMatch, VerdictLabel,
};

/// Retrieval result for one chunk as seen by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Matches(Vec<RetrievalMatch>),
    /// Retries exhausted or deadline hit; the chunk is scored on rules alone.
    Unavailable { reason: String, attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    threshold: f32,
    disclosure_discount: f32,
    weights: SeverityWeights,
    catalog: Arc<RuleCatalog>,
}

impl Aggregator {
    pub fn new(threshold: f32, disclosure_discount: f32, catalog: Arc<RuleCatalog>) -> Self {
        Self {
            threshold,
            disclosure_discount,
            weights: SeverityWeights::default(),
            catalog,
        }
    }

    pub fn with_weights(mut self, weights: SeverityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn from_config(config: &AnalysisConfig, catalog: Arc<RuleCatalog>) -> Self {
        Self::new(config.score_threshold, config.disclosure_discount, catalog)
            .with_weights(config.severity_weights)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn aggregate_chunk(
        &self,
        chunk: Chunk,
        outcome: RuleOutcome,
        retrieval: Retrieval,
    ) -> ChunkVerdict {
        let rule_weight = outcome
            .findings
            .iter()
            .map(|finding| self.weights.weight(finding.severity))
            .fold(0.0f32, f32::max);

        let (evidence, annotations) = match retrieval {
            Retrieval::Matches(matches) => (matches, Vec::new()),
            Retrieval::Unavailable { reason, attempts } => (
                Vec::new(),
                vec![ChunkAnnotation::RetrievalUnavailable { reason, attempts }],
            ),
        };

        let mut retrieval_weight = non_compliant_mass(&evidence);
        if !outcome.disclosures.is_empty() {
            retrieval_weight *= 1.0 - self.disclosure_discount;
        }

        let score = rule_weight.max(retrieval_weight).clamp(0.0, 1.0);
        let label = if score >= self.threshold {
            VerdictLabel::Flagged
        } else {
            VerdictLabel::Compliant
        };

        ChunkVerdict {
            chunk,
            score,
            rule_weight,
            retrieval_weight,
            label,
            findings: outcome.findings,
            evidence,
            disclosures: outcome.disclosures,
            annotations,
        }
    }

    /// Reduces chunk verdicts (in any order) into the document report.
    pub fn aggregate_document(
        &self,
        document: &Document,
        mut verdicts: Vec<ChunkVerdict>,
    ) -> ComplianceReport {
        verdicts.sort_by_key(|verdict| verdict.chunk.index);

        let overall_score = if verdicts.is_empty() {
            0.0
        } else {
            let total: f32 = verdicts.iter().map(|verdict| verdict.score).sum();
            (total / verdicts.len() as f32).clamp(0.0, 1.0)
        };

        let escalated = verdicts
            .iter()
            .any(|verdict| verdict.is_flagged() && verdict.has_violation());
        let overall_label = if escalated {
            DocumentLabel::NonCompliant
        } else if !verdicts.is_empty() && overall_score >= self.threshold {
            DocumentLabel::Flagged
        } else {
            DocumentLabel::Compliant
        };

        let degraded_chunks = verdicts
            .iter()
            .filter(|verdict| verdict.retrieval_unavailable())
            .count();

        let recommendations = self.catalog.recommendations(
            verdicts
                .iter()
                .flat_map(|verdict| verdict.findings.iter())
                .map(|finding| finding.rule_id.as_str()),
        );

        let metadata = document.metadata();
        let document_type = metadata
            .document_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| identify_document_type(document.text()).to_string());

        ComplianceReport {
            document_id: document.id().to_string(),
            title: metadata.title.clone(),
            document_type,
            overall_score,
            overall_label,
            chunks: verdicts,
            degraded_chunks,
            financial_terms: extract_financial_terms(document.text()),
            recommendations,
            generated_at: Utc::now(),
        }
    }
}

fn non_compliant_mass(matches: &[RetrievalMatch]) -> f32 {
    if matches.is_empty() {
        return 0.0;
    }
    let mass: f32 = matches
        .iter()
        .filter(|m| m.label == ComplianceLabel::NonCompliant)
        .map(|m| m.similarity)
        .sum();
    mass / matches.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{
        DisclosureMatch, DocumentMetadata, ReferencePassage, RuleFinding, Severity, Span,
    };

    fn aggregator(threshold: f32) -> Aggregator {
        Aggregator::new(threshold, 0.5, Arc::new(RuleCatalog::builtin().unwrap()))
    }

    fn chunk(index: usize) -> Chunk {
        Chunk {
            index,
            start: index * 10,
            end: index * 10 + 10,
            text: "0123456789".to_string(),
        }
    }

    fn finding(index: usize, rule_id: &str, severity: Severity) -> RuleFinding {
        RuleFinding {
            chunk_index: index,
            rule_id: rule_id.to_string(),
            severity,
            span: Span { start: 0, end: 1 },
            matched: "x".to_string(),
            explanation: "x".to_string(),
        }
    }

    fn evidence(label: ComplianceLabel, similarity: f32) -> RetrievalMatch {
        RetrievalMatch {
            chunk_index: 0,
            passage: ReferencePassage {
                id: "p".to_string(),
                text: "p".to_string(),
                label,
                rationale: String::new(),
                source: None,
                seq: 0,
            },
            similarity,
            label,
        }
    }

    fn disclosure() -> DisclosureMatch {
        DisclosureMatch {
            chunk_index: 0,
            disclosure_id: "past_performance".to_string(),
            span: Span { start: 0, end: 5 },
            matched: "x".to_string(),
        }
    }

    fn outcome(findings: Vec<RuleFinding>) -> RuleOutcome {
        RuleOutcome {
            findings,
            disclosures: Vec::new(),
        }
    }

    #[test]
    fn rule_weight_is_the_heaviest_severity() {
        let verdict = aggregator(0.5).aggregate_chunk(
            chunk(0),
            outcome(vec![
                finding(0, "return_figures", Severity::Info),
                finding(0, "guaranteed_returns", Severity::Violation),
            ]),
            Retrieval::Matches(Vec::new()),
        );
        assert_eq!(verdict.rule_weight, 1.0);
        assert_eq!(verdict.score, 1.0);
        assert!(verdict.is_flagged());
    }

    #[test]
    fn severity_weights_come_from_configuration() {
        let warning = || outcome(vec![finding(0, "missing_risk_disclosure", Severity::Warning)]);

        let default = aggregator(0.5).aggregate_chunk(chunk(0), warning(), Retrieval::Matches(Vec::new()));
        assert!(default.is_flagged());

        let lenient = aggregator(0.5).with_weights(SeverityWeights {
            warning: 0.3,
            ..SeverityWeights::default()
        });
        let verdict = lenient.aggregate_chunk(chunk(0), warning(), Retrieval::Matches(Vec::new()));
        assert!((verdict.rule_weight - 0.3).abs() < 1e-6);
        assert_eq!(verdict.label, VerdictLabel::Compliant);

        let mut config = AnalysisConfig::default();
        config.severity_weights.info = 0.6;
        let strict = Aggregator::from_config(&config, Arc::new(RuleCatalog::builtin().unwrap()));
        let verdict = strict.aggregate_chunk(
            chunk(0),
            outcome(vec![finding(0, "return_figures", Severity::Info)]),
            Retrieval::Matches(Vec::new()),
        );
        assert!(verdict.is_flagged());
    }

    #[test]
    fn retrieval_weight_averages_non_compliant_similarity() {
        let verdict = aggregator(0.5).aggregate_chunk(
            chunk(0),
            outcome(Vec::new()),
            Retrieval::Matches(vec![
                evidence(ComplianceLabel::NonCompliant, 0.9),
                evidence(ComplianceLabel::NonCompliant, 0.7),
                evidence(ComplianceLabel::Compliant, 0.8),
                evidence(ComplianceLabel::Neutral, 0.6),
            ]),
        );
        assert!((verdict.retrieval_weight - 0.4).abs() < 1e-6);
        assert_eq!(verdict.label, VerdictLabel::Compliant);
    }

    #[test]
    fn disclosures_discount_retrieval_but_not_rules() {
        let verdict = aggregator(0.5).aggregate_chunk(
            chunk(0),
            RuleOutcome {
                findings: vec![finding(0, "return_figures", Severity::Info)],
                disclosures: vec![disclosure()],
            },
            Retrieval::Matches(vec![evidence(ComplianceLabel::NonCompliant, 0.8)]),
        );
        assert!((verdict.retrieval_weight - 0.4).abs() < 1e-6);
        assert!((verdict.rule_weight - 0.1).abs() < 1e-6);
        assert!((verdict.score - 0.4).abs() < 1e-6);
        assert!(!verdict.is_flagged());
    }

    #[test]
    fn flagging_is_inclusive_at_the_threshold() {
        let warning = || outcome(vec![finding(0, "missing_risk_disclosure", Severity::Warning)]);

        let at = aggregator(0.5).aggregate_chunk(chunk(0), warning(), Retrieval::Matches(Vec::new()));
        assert_eq!(at.score, 0.5);
        assert!(at.is_flagged());

        let above = aggregator(0.51).aggregate_chunk(chunk(0), warning(), Retrieval::Matches(Vec::new()));
        assert!(!above.is_flagged());
    }

    #[test]
    fn unavailable_retrieval_is_annotated_and_rule_only() {
        let verdict = aggregator(0.5).aggregate_chunk(
            chunk(2),
            outcome(Vec::new()),
            Retrieval::Unavailable {
                reason: "vector index unavailable: down".to_string(),
                attempts: 2,
            },
        );
        assert!(verdict.retrieval_unavailable());
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.evidence.is_empty());
    }

    #[test]
    fn empty_document_is_compliant_with_zero_score() {
        let document = Document::new("empty", "", DocumentMetadata::default());
        let report = aggregator(0.5).aggregate_document(&document, Vec::new());
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.overall_label, DocumentLabel::Compliant);
        assert!(report.chunks.is_empty());
        assert_eq!(report.document_type, "general");
    }

    #[test]
    fn document_label_escalates_on_flagged_violation() {
        let agg = aggregator(0.5);
        let document = Document::new("d", "We guarantee it.", DocumentMetadata::default());
        let verdicts = vec![
            agg.aggregate_chunk(chunk(1), outcome(Vec::new()), Retrieval::Matches(Vec::new())),
            agg.aggregate_chunk(chunk(0), outcome(Vec::new()), Retrieval::Matches(Vec::new())),
            agg.aggregate_chunk(
                chunk(2),
                outcome(vec![finding(2, "guaranteed_returns", Severity::Violation)]),
                Retrieval::Matches(Vec::new()),
            ),
        ];
        let report = agg.aggregate_document(&document, verdicts);

        let order: Vec<usize> = report.chunks.iter().map(|v| v.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!((report.overall_score - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(report.overall_label, DocumentLabel::NonCompliant);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn mean_above_threshold_without_violation_is_flagged() {
        let agg = aggregator(0.5);
        let document = Document::new(
            "d",
            "text",
            DocumentMetadata {
                title: Some("Brochure".to_string()),
                document_type: Some("prospectus".to_string()),
            },
        );
        let verdicts = vec![agg.aggregate_chunk(
            chunk(0),
            outcome(vec![finding(0, "missing_risk_disclosure", Severity::Warning)]),
            Retrieval::Matches(Vec::new()),
        )];
        let report = agg.aggregate_document(&document, verdicts);
        assert_eq!(report.overall_label, DocumentLabel::Flagged);
        assert_eq!(report.document_type, "prospectus");
        assert_eq!(report.title.as_deref(), Some("Brochure"));
    }
}
