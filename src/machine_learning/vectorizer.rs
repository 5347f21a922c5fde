use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Sparse row: (feature index, value) pairs sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// Serialized form of a fitted TF-IDF vectorizer.
#[derive(Debug, Clone, Deserialize)]
pub struct TfidfParams {
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default)]
    pub binary: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default)]
    pub stop_words: Vec<String>,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

/// Maps text to TF-IDF weighted term vectors over a fixed vocabulary.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "TfidfParams")]
pub struct TfidfVectorizer {
    params: TfidfParams,
    token_regex: Regex,
    stop_words: HashSet<String>,
}

impl TryFrom<TfidfParams> for TfidfVectorizer {
    type Error = regex::Error;

    fn try_from(params: TfidfParams) -> Result<Self, Self::Error> {
        let token_regex = Regex::new(&params.token_pattern)?;
        let stop_words = params.stop_words.iter().cloned().collect();
        Ok(Self {
            params,
            token_regex,
            stop_words,
        })
    }
}

impl TfidfVectorizer {
    pub fn n_features(&self) -> usize {
        self.params.vocabulary.len()
    }

    pub fn params(&self) -> &TfidfParams {
        &self.params
    }

    /// Vectorize a whole batch; one row per input, in input order.
    pub fn transform(&self, texts: &[&str]) -> Vec<SparseVector> {
        texts.iter().map(|text| self.transform_one(text)).collect()
    }

    pub fn transform_one(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyze(text) {
            if let Some(&index) = self.params.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(index, count)| {
                let mut tf = if self.params.binary { 1.0 } else { count };
                if self.params.sublinear_tf {
                    tf = 1.0 + tf.ln();
                }
                let idf = self
                    .params
                    .idf
                    .as_ref()
                    .and_then(|idf| idf.get(index).copied())
                    .unwrap_or(1.0);
                (index, tf * idf)
            })
            .collect();

        if let Some(norm) = self.params.norm {
            let length = match norm {
                Norm::L1 => row.iter().map(|(_, v)| v.abs()).sum::<f64>(),
                Norm::L2 => row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            };
            if length > 0.0 {
                for (_, value) in row.iter_mut() {
                    *value /= length;
                }
            }
        }

        row
    }

    /// Lowercase, tokenize, drop stop words, then build word n-grams.
    fn analyze(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = self
            .token_regex
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|token| !self.stop_words.contains(*token))
            .collect();

        let (min_n, max_n) = self.params.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n == 0 || n > tokens.len() {
                continue;
            }
            terms.extend(tokens.windows(n).map(|window| window.join(" ")));
        }
        terms
    }
}
