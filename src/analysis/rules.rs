//! Data-driven pattern rules.
//!
//! A `RuleCatalog` is loaded from YAML (the built-in catalog ships with the
//! binary) and compiled once. `RuleScorer` applies it to chunks; adding a rule
//! is a catalog edit and never touches the scoring code.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::error::AnalysisError;
use super::types::{Chunk, DisclosureMatch, RuleFinding, Severity, Span};

const BUILTIN_CATALOG: &str = include_str!("default_rules.yml");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Evaluated independently on every chunk.
    #[default]
    Chunk,
    /// Evaluated once over the whole document.
    Document,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    rules: Vec<RuleDefinition>,
    #[serde(default)]
    disclosures: Vec<DisclosureDefinition>,
}

#[derive(Debug, Deserialize)]
struct RuleDefinition {
    id: String,
    pattern: String,
    severity: Severity,
    explanation: String,
    #[serde(default)]
    scope: RuleScope,
    #[serde(default)]
    unless: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisclosureDefinition {
    id: String,
    pattern: String,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: String,
    pub pattern: String,
    pub severity: Severity,
    pub explanation: String,
    pub scope: RuleScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip)]
    regex: Regex,
    #[serde(skip)]
    unless_regex: Option<Regex>,
}

impl Rule {
    /// Renders the explanation template for one match.
    pub fn explain(&self, matched: &str) -> String {
        self.explanation.replace("{matched}", matched)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Disclosure {
    pub id: String,
    pub pattern: String,
    pub explanation: String,
    #[serde(skip)]
    regex: Regex,
}

/// Ordered, compiled rule set.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
    disclosures: Vec<Disclosure>,
}

impl RuleCatalog {
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::configuration(format!(
                "failed to read rule catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, AnalysisError> {
        let file: CatalogFile = serde_yaml::from_str(content)
            .map_err(|e| AnalysisError::configuration(format!("invalid rule catalog: {}", e)))?;

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(file.rules.len());
        for def in file.rules {
            check_id(&def.id, &mut seen)?;
            let regex = compile(&def.id, &def.pattern)?;
            let unless_regex = def
                .unless
                .as_deref()
                .map(|pattern| compile(&def.id, pattern))
                .transpose()?;
            rules.push(Rule {
                id: def.id,
                pattern: def.pattern,
                severity: def.severity,
                explanation: def.explanation,
                scope: def.scope,
                unless: def.unless,
                recommendation: def.recommendation,
                regex,
                unless_regex,
            });
        }

        let mut disclosures = Vec::with_capacity(file.disclosures.len());
        for def in file.disclosures {
            check_id(&def.id, &mut seen)?;
            let regex = compile(&def.id, &def.pattern)?;
            disclosures.push(Disclosure {
                id: def.id,
                pattern: def.pattern,
                explanation: def.explanation,
                regex,
            });
        }

        Ok(Self { rules, disclosures })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// Recommendations of the given rules, deduplicated, in catalog order.
    pub fn recommendations<'a>(&self, fired: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let fired: HashSet<&str> = fired.into_iter().collect();
        let mut out: Vec<String> = Vec::new();
        for rule in &self.rules {
            if !fired.contains(rule.id.as_str()) {
                continue;
            }
            if let Some(text) = &rule.recommendation {
                if !out.contains(text) {
                    out.push(text.clone());
                }
            }
        }
        out
    }
}

fn check_id(id: &str, seen: &mut HashSet<String>) -> Result<(), AnalysisError> {
    if id.trim().is_empty() {
        return Err(AnalysisError::configuration("rule id must not be empty"));
    }
    if !seen.insert(id.to_string()) {
        return Err(AnalysisError::configuration(format!(
            "duplicate rule id '{}'",
            id
        )));
    }
    Ok(())
}

fn compile(id: &str, pattern: &str) -> Result<Regex, AnalysisError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| AnalysisError::configuration(format!("rule '{}': invalid pattern: {}", id, e)))
}

/// Rule findings and disclosure matches for one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub findings: Vec<RuleFinding>,
    pub disclosures: Vec<DisclosureMatch>,
}

/// Applies a catalog to chunks. Pure: the same chunk always yields the same findings.
#[derive(Debug, Clone)]
pub struct RuleScorer {
    catalog: Arc<RuleCatalog>,
}

impl RuleScorer {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn score(&self, chunk: &Chunk) -> Vec<RuleFinding> {
        self.evaluate(chunk).findings
    }

    /// Disclosures found inside the chunk text alone.
    pub fn disclosures(&self, chunk: &Chunk) -> Vec<DisclosureMatch> {
        self.scan_disclosures(&chunk.text, chunk.start)
            .into_iter()
            .map(|d| DisclosureMatch {
                chunk_index: chunk.index,
                ..d
            })
            .collect()
    }

    /// Disclosures over a whole document text, with absolute offsets.
    ///
    /// Chunk indices are left at 0; `evaluate_with` assigns them per chunk.
    pub fn document_disclosures(&self, text: &str) -> Vec<DisclosureMatch> {
        self.scan_disclosures(text, 0)
    }

    fn scan_disclosures(&self, text: &str, base: usize) -> Vec<DisclosureMatch> {
        let mut found = Vec::new();
        for disclosure in &self.catalog.disclosures {
            for m in disclosure.regex.find_iter(text) {
                found.push(DisclosureMatch {
                    chunk_index: 0,
                    disclosure_id: disclosure.id.clone(),
                    span: Span {
                        start: base + m.start(),
                        end: base + m.end(),
                    },
                    matched: m.as_str().to_string(),
                });
            }
        }
        found
    }

    /// Scores a chunk in isolation, shielding only by disclosures inside it.
    pub fn evaluate(&self, chunk: &Chunk) -> RuleOutcome {
        let disclosures = self.scan_disclosures(&chunk.text, chunk.start);
        self.evaluate_with(chunk, &disclosures)
    }

    /// Chunk-scope findings plus the disclosures overlapping the chunk.
    ///
    /// `document_disclosures` carry absolute offsets, so a disclosure cut in
    /// two by a chunk boundary still shields the part of it in this chunk. A
    /// match lying entirely inside a disclosure span produces no finding.
    pub fn evaluate_with(
        &self,
        chunk: &Chunk,
        document_disclosures: &[DisclosureMatch],
    ) -> RuleOutcome {
        let mut findings = Vec::new();

        for rule in self
            .catalog
            .rules
            .iter()
            .filter(|rule| rule.scope == RuleScope::Chunk)
        {
            if rule
                .unless_regex
                .as_ref()
                .is_some_and(|unless| unless.is_match(&chunk.text))
            {
                continue;
            }
            for m in rule.regex.find_iter(&chunk.text) {
                let span = Span {
                    start: chunk.start + m.start(),
                    end: chunk.start + m.end(),
                };
                if shielded(&span, document_disclosures) {
                    continue;
                }
                findings.push(RuleFinding {
                    chunk_index: chunk.index,
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    span,
                    matched: m.as_str().to_string(),
                    explanation: rule.explain(m.as_str()),
                });
            }
        }

        let disclosures = document_disclosures
            .iter()
            .filter(|d| d.span.start < chunk.end && d.span.end > chunk.start)
            .map(|d| DisclosureMatch {
                chunk_index: chunk.index,
                ..d.clone()
            })
            .collect();

        RuleOutcome {
            findings,
            disclosures,
        }
    }

    /// Document-scope findings over the full document `text`.
    ///
    /// Each document rule fires at most once: when its pattern matches and
    /// neither its `unless` pattern nor any disclosure appears anywhere in the
    /// text. The finding is attached to the chunk containing the trigger.
    pub fn score_document(&self, text: &str, chunks: &[Chunk]) -> Vec<RuleFinding> {
        let document_rules: Vec<&Rule> = self
            .catalog
            .rules
            .iter()
            .filter(|rule| rule.scope == RuleScope::Document)
            .collect();
        if document_rules.is_empty() || chunks.is_empty() {
            return Vec::new();
        }

        if self
            .catalog
            .disclosures
            .iter()
            .any(|d| d.regex.is_match(text))
        {
            return Vec::new();
        }

        let mut findings = Vec::new();
        for rule in document_rules {
            if rule
                .unless_regex
                .as_ref()
                .is_some_and(|unless| unless.is_match(text))
            {
                continue;
            }

            let Some(m) = rule.regex.find(text) else {
                continue;
            };
            let chunk_index = chunks
                .iter()
                .find(|chunk| chunk.start <= m.start() && m.start() < chunk.end)
                .unwrap_or(&chunks[0])
                .index;
            findings.push(RuleFinding {
                chunk_index,
                rule_id: rule.id.clone(),
                severity: rule.severity,
                span: Span {
                    start: m.start(),
                    end: m.end(),
                },
                matched: m.as_str().to_string(),
                explanation: rule.explain(m.as_str()),
            });
        }
        findings
    }
}

fn shielded(span: &Span, disclosures: &[DisclosureMatch]) -> bool {
    disclosures.iter().any(|d| d.span.contains(span))
}
