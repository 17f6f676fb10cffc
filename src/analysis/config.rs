use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AnalysisError;
use super::types::Severity;

pub const DEFAULT_MAX_CHARS: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 5;
/// Chunk and document score at or above which content is flagged.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;
pub const DEFAULT_DEADLINE_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
pub const DEFAULT_DISCLOSURE_DISCOUNT: f32 = 0.5;
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 200_000;

/// Rule weight contributed by a finding of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub info: f32,
    pub warning: f32,
    pub violation: f32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            info: 0.1,
            warning: 0.5,
            violation: 1.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f32 {
        match severity {
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Violation => self.violation,
        }
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        for (name, value) in [
            ("severity_weights.info", self.info),
            ("severity_weights.warning", self.warning),
            ("severity_weights.violation", self.violation),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::configuration(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Tuning knobs for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum chunk size in characters
    pub max_chars: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
    /// Reference passages retrieved per chunk
    pub k: usize,
    pub score_threshold: f32,
    /// Maximum chunks in flight at once
    pub concurrency_limit: usize,
    /// Budget for the whole analysis, in milliseconds
    pub deadline_ms: u64,
    /// Extra attempts for a failed retrieval before degrading the chunk
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Fraction of retrieval weight removed when a chunk carries risk disclosures
    pub disclosure_discount: f32,
    /// Documents longer than this are rejected as unreadable
    pub max_document_chars: usize,
    pub severity_weights: SeverityWeights,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap: DEFAULT_OVERLAP,
            k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            deadline_ms: DEFAULT_DEADLINE_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            disclosure_discount: DEFAULT_DISCLOSURE_DISCOUNT,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
            severity_weights: SeverityWeights::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Rejects out-of-range values before any processing starts.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        check_range("max_chars", self.max_chars as u64, 1, 100_000)?;
        if self.overlap >= self.max_chars {
            return Err(AnalysisError::configuration(format!(
                "overlap ({}) must be smaller than max_chars ({})",
                self.overlap, self.max_chars
            )));
        }
        check_range("k", self.k as u64, 1, 100)?;
        check_range("concurrency_limit", self.concurrency_limit as u64, 1, 256)?;
        check_range("deadline_ms", self.deadline_ms, 1, 600_000)?;
        check_range("max_retries", u64::from(self.max_retries), 0, 5)?;
        check_range("retry_backoff_ms", self.retry_backoff_ms, 0, 10_000)?;
        check_range(
            "max_document_chars",
            self.max_document_chars as u64,
            1,
            10_000_000,
        )?;

        if !self.score_threshold.is_finite()
            || self.score_threshold <= 0.0
            || self.score_threshold > 1.0
        {
            return Err(AnalysisError::configuration(format!(
                "score_threshold must be in (0, 1], got {}",
                self.score_threshold
            )));
        }
        if !self.disclosure_discount.is_finite()
            || !(0.0..=1.0).contains(&self.disclosure_discount)
        {
            return Err(AnalysisError::configuration(format!(
                "disclosure_discount must be in [0, 1], got {}",
                self.disclosure_discount
            )));
        }
        self.severity_weights.validate()?;

        Ok(())
    }

    /// Returns a validated copy with the caller's overrides applied.
    pub fn with_overrides(&self, overrides: &AnalysisOverrides) -> Result<Self, AnalysisError> {
        let mut merged = self.clone();
        if let Some(value) = overrides.max_chars {
            merged.max_chars = value;
        }
        if let Some(value) = overrides.overlap {
            merged.overlap = value;
        }
        if let Some(value) = overrides.k {
            merged.k = value;
        }
        if let Some(value) = overrides.score_threshold {
            merged.score_threshold = value;
        }
        if let Some(value) = overrides.concurrency_limit {
            merged.concurrency_limit = value;
        }
        if let Some(value) = overrides.deadline_ms {
            merged.deadline_ms = value;
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Per-request overrides accepted at the HTTP boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOverrides {
    pub max_chars: Option<usize>,
    pub overlap: Option<usize>,
    pub k: Option<usize>,
    pub score_threshold: Option<f32>,
    pub concurrency_limit: Option<usize>,
    pub deadline_ms: Option<u64>,
}

impl AnalysisOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), AnalysisError> {
    if value < min || value > max {
        return Err(AnalysisError::configuration(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}
