pub mod keywords;
pub mod link_analyzer;

use crate::email::RawEmail;
use crate::normalization::TextNormalizer;
use keywords::{PHISHING_KEYWORDS, STOPWORDS};
use link_analyzer::LinkAnalyzer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Signals derived from a single message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    /// Stopword-filtered tokens of the cleaned body and subject.
    #[serde(rename = "text")]
    pub normalized_text: String,
    pub link_count: usize,
    /// Share of uppercase characters in the raw body, in [0, 1].
    pub capital_ratio: f64,
    pub keyword_count: usize,
    pub links: Vec<String>,
}

pub struct FeatureExtractor {
    normalizer: TextNormalizer,
    link_analyzer: LinkAnalyzer,
    token_regex: Regex,
    stopwords: HashSet<&'static str>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            normalizer: TextNormalizer::new(),
            link_analyzer: LinkAnalyzer::new(),
            token_regex: Regex::new(r"[a-z]{3,}").unwrap(),
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    pub fn extract(&self, email: &RawEmail) -> FeatureBundle {
        // The subject is appended even when empty so the join is stable.
        let cleaned = self
            .normalizer
            .normalize(&format!("{} {}", email.body, email.subject));

        let normalized_text = self
            .token_regex
            .find_iter(&cleaned)
            .map(|m| m.as_str())
            .filter(|token| !self.stopwords.contains(token))
            .collect::<Vec<_>>()
            .join(" ");

        let keyword_count = PHISHING_KEYWORDS
            .iter()
            .filter(|keyword| cleaned.contains(*keyword))
            .count();

        let links = self.link_analyzer.extract_links(&email.body);

        FeatureBundle {
            normalized_text,
            link_count: links.len(),
            capital_ratio: capital_ratio(&email.body),
            keyword_count,
            links,
        }
    }

    pub fn extract_batch(&self, emails: &[RawEmail]) -> Vec<FeatureBundle> {
        emails.iter().map(|email| self.extract(email)).collect()
    }
}

/// Uppercase characters over total characters; an empty body yields 0.
pub fn capital_ratio(body: &str) -> f64 {
    let total = body.chars().count().max(1);
    let upper = body.chars().filter(|c| c.is_uppercase()).count();
    upper as f64 / total as f64
}
