use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::time::{timeout_at, Instant};

use super::aggregator::{Aggregator, Retrieval};
use super::chunker::Chunker;
use super::config::{AnalysisConfig, AnalysisOverrides};
use super::error::AnalysisError;
use super::retriever::Retriever;
use super::rules::{RuleCatalog, RuleOutcome, RuleScorer};
use super::types::{Chunk, ComplianceReport, DisclosureMatch, Document};
use crate::embedding::Embedder;
use crate::index::VectorIndex;

/// Single entry point of the compliance pipeline.
///
/// Chunks are processed concurrently (bounded by `concurrency_limit`); for
/// each chunk rule scoring and retrieval run side by side. Retrieval failures
/// are retried and then degrade the chunk to rule-only scoring, so an analysis
/// only fails on configuration or document-read errors.
pub struct ComplianceService {
    config: AnalysisConfig,
    retriever: Retriever,
    scorer: RuleScorer,
    catalog: Arc<RuleCatalog>,
}

impl ComplianceService {
    pub fn new(
        config: AnalysisConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<RuleCatalog>,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            retriever: Retriever::new(embedder, index),
            scorer: RuleScorer::new(catalog.clone()),
            catalog,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn scorer(&self) -> &RuleScorer {
        &self.scorer
    }

    pub async fn analyze(&self, document: &Document) -> Result<ComplianceReport, AnalysisError> {
        self.analyze_with(document, &AnalysisOverrides::default())
            .await
    }

    pub async fn analyze_with(
        &self,
        document: &Document,
        overrides: &AnalysisOverrides,
    ) -> Result<ComplianceReport, AnalysisError> {
        let config = self.config.with_overrides(overrides)?;

        let chars = document.char_count();
        if chars > config.max_document_chars {
            return Err(AnalysisError::document_read(format!(
                "document has {} characters, limit is {}",
                chars, config.max_document_chars
            )));
        }

        let chunker = Chunker::from_config(&config)?;
        let chunks: Vec<Chunk> = chunker.chunk(document).iter().collect();
        let started = Instant::now();
        let deadline = started + config.deadline();

        tracing::info!(
            document_id = %document.id(),
            chunks = chunks.len(),
            concurrency = config.concurrency_limit,
            "Starting compliance analysis"
        );

        let document_findings = self.scorer.score_document(document.text(), &chunks);
        let disclosures = self.scorer.document_disclosures(document.text());

        let processed: Vec<(Chunk, RuleOutcome, Retrieval)> = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| self.process_chunk(chunk, &disclosures, &config, deadline)),
        )
        .buffer_unordered(config.concurrency_limit)
        .collect()
        .await;

        let aggregator = Aggregator::from_config(&config, self.catalog.clone());
        let mut verdicts = Vec::with_capacity(processed.len());
        for (chunk, mut outcome, retrieval) in processed {
            outcome.findings.extend(
                document_findings
                    .iter()
                    .filter(|finding| finding.chunk_index == chunk.index)
                    .cloned(),
            );
            verdicts.push(aggregator.aggregate_chunk(chunk, outcome, retrieval));
        }
        verdicts.sort_by_key(|verdict| verdict.chunk.index);

        let report = aggregator.aggregate_document(document, verdicts);

        tracing::info!(
            document_id = %report.document_id,
            score = report.overall_score,
            label = ?report.overall_label,
            flagged = report.flagged_chunks().count(),
            degraded = report.degraded_chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compliance analysis complete"
        );

        Ok(report)
    }

    async fn process_chunk(
        &self,
        chunk: Chunk,
        disclosures: &[DisclosureMatch],
        config: &AnalysisConfig,
        deadline: Instant,
    ) -> (Chunk, RuleOutcome, Retrieval) {
        let scoring = async { self.scorer.evaluate_with(&chunk, disclosures) };
        let retrieval = self.retrieve_with_retry(&chunk, config, deadline);
        let (outcome, retrieval) = tokio::join!(scoring, retrieval);
        (chunk, outcome, retrieval)
    }

    async fn retrieve_with_retry(
        &self,
        chunk: &Chunk,
        config: &AnalysisConfig,
        deadline: Instant,
    ) -> Retrieval {
        let mut attempts: u32 = 0;

        let result = timeout_at(deadline, async {
            loop {
                attempts += 1;
                match self.retriever.retrieve(chunk, config.k).await {
                    Ok(matches) => return Ok(matches),
                    Err(e) if e.is_retryable() && attempts <= config.max_retries => {
                        tracing::debug!(
                            "Retrieval for chunk {} failed (attempt {}/{}): {}",
                            chunk.index,
                            attempts,
                            config.max_retries + 1,
                            e
                        );
                        tokio::time::sleep(config.retry_backoff() * attempts).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match result {
            Ok(Ok(matches)) => Retrieval::Matches(matches),
            Ok(Err(e)) => {
                tracing::warn!(
                    "Chunk {} degraded to rule-only scoring after {} attempt(s): {}",
                    chunk.index,
                    attempts,
                    e
                );
                Retrieval::Unavailable {
                    reason: e.to_string(),
                    attempts,
                }
            }
            Err(_) => {
                tracing::warn!(
                    "Chunk {} retrieval missed the {} ms deadline",
                    chunk.index,
                    config.deadline_ms
                );
                Retrieval::Unavailable {
                    reason: format!("deadline of {} ms exceeded", config.deadline_ms),
                    attempts,
                }
            }
        }
    }
}
