//! Document profiling: type inference and financial-term extraction.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Policy,
    Prospectus,
    Report,
    Disclosure,
    General,
}

/// Indicator phrases, checked in this order; the first type with a hit wins.
const TYPE_INDICATORS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::Policy,
        &["policy", "terms and conditions", "agreement", "contract"],
    ),
    (
        DocumentType::Prospectus,
        &["prospectus", "fund information", "investment objectives"],
    ),
    (
        DocumentType::Report,
        &["annual report", "quarterly report", "financial statement"],
    ),
    (
        DocumentType::Disclosure,
        &["disclosure", "risk factors", "important information"],
    ),
];

const FINANCIAL_TERMS: &[&str] = &[
    // investing
    "portfolio",
    "diversification",
    "asset allocation",
    "risk tolerance",
    "return on investment",
    "roi",
    "dividend",
    "yield",
    "capital gains",
    "mutual fund",
    "etf",
    "bond",
    "stock",
    "equity",
    "fixed income",
    // risk
    "market risk",
    "credit risk",
    "liquidity risk",
    "inflation risk",
    "volatility",
    "beta",
    "standard deviation",
    "sharpe ratio",
    // compliance
    "fiduciary",
    "suitability",
    "disclosure",
    "regulation",
    "compliance",
    "sec",
    "finra",
    "know your customer",
    "kyc",
    "anti-money laundering",
    "aml",
    "privacy policy",
    "data protection",
    // planning
    "retirement planning",
    "estate planning",
    "tax planning",
    "emergency fund",
    "insurance",
    "annuity",
    "ira",
    "401k",
    "pension",
    "social security",
];

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Policy,
        DocumentType::Prospectus,
        DocumentType::Report,
        DocumentType::Disclosure,
        DocumentType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Prospectus => "prospectus",
            Self::Report => "report",
            Self::Disclosure => "disclosure",
            Self::General => "general",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Policy => "Client agreements, terms and conditions, advisory contracts",
            Self::Prospectus => "Fund prospectuses and offering documents",
            Self::Report => "Annual and quarterly reports, financial statements",
            Self::Disclosure => "Risk disclosures and regulatory notices",
            Self::General => "Marketing material and other financial communications",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a document from indicator phrases in its text.
pub fn identify_document_type(text: &str) -> DocumentType {
    let normalized = normalize(text);
    TYPE_INDICATORS
        .iter()
        .find(|(_, indicators)| indicators.iter().any(|phrase| contains_phrase(&normalized, phrase)))
        .map(|(doc_type, _)| *doc_type)
        .unwrap_or(DocumentType::General)
}

/// Known financial terms present in `text`, sorted and deduplicated.
pub fn extract_financial_terms(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    FINANCIAL_TERMS
        .iter()
        .filter(|term| contains_phrase(&normalized, term))
        .map(|term| term.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Lower-cased words joined by single spaces, padded so that phrase
/// lookups only match whole words.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&normalize(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_indicators_take_precedence() {
        let text = "This Advisory Agreement describes the fund information and risk factors.";
        assert_eq!(identify_document_type(text), DocumentType::Policy);
    }

    #[test]
    fn each_type_is_recognised() {
        assert_eq!(
            identify_document_type("Read the PROSPECTUS carefully."),
            DocumentType::Prospectus
        );
        assert_eq!(
            identify_document_type("Quarterly report for Q3"),
            DocumentType::Report
        );
        assert_eq!(
            identify_document_type("Important information about your account"),
            DocumentType::Disclosure
        );
        assert_eq!(
            identify_document_type("Welcome to our newsletter"),
            DocumentType::General
        );
    }

    #[test]
    fn terms_match_whole_words_only() {
        let text = "Our portfolio holds bonds and a Mutual Fund. See the second page for ETF fees.";
        let terms = extract_financial_terms(text);
        assert_eq!(terms, vec!["etf", "mutual fund", "portfolio"]);
    }

    #[test]
    fn hyphenated_terms_are_found() {
        let terms = extract_financial_terms("We follow anti-money laundering (AML) and KYC rules.");
        assert_eq!(terms, vec!["aml", "anti-money laundering", "kyc"]);
    }

    #[test]
    fn empty_text_has_no_terms() {
        assert!(extract_financial_terms("").is_empty());
        assert_eq!(identify_document_type(""), DocumentType::General);
    }
}
