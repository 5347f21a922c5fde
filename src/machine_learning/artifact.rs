use super::vectorizer::{SparseVector, TfidfVectorizer};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("inconsistent model artifact: {0}")]
    Shape(String),
}

/// Fitted binary classifier over the vectorizer's feature space. Class 1
/// is spam.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbabilisticModel {
    LogisticRegression {
        coef: Vec<f64>,
        intercept: f64,
    },
    MultinomialNb {
        /// Log priors, `[ham, spam]`.
        class_log_prior: [f64; 2],
        /// Per-class log feature probabilities, `[ham, spam]`.
        feature_log_prob: [Vec<f64>; 2],
    },
}

impl ProbabilisticModel {
    pub fn spam_probability(&self, row: &SparseVector) -> f64 {
        match self {
            ProbabilisticModel::LogisticRegression { coef, intercept } => {
                let z = intercept + dot(coef, row);
                sigmoid(z)
            }
            ProbabilisticModel::MultinomialNb {
                class_log_prior,
                feature_log_prob,
            } => {
                let ham = class_log_prior[0] + dot(&feature_log_prob[0], row);
                let spam = class_log_prior[1] + dot(&feature_log_prob[1], row);
                // P(spam) = e^spam / (e^ham + e^spam)
                sigmoid(spam - ham)
            }
        }
    }

    fn dimensions(&self) -> Vec<usize> {
        match self {
            ProbabilisticModel::LogisticRegression { coef, .. } => vec![coef.len()],
            ProbabilisticModel::MultinomialNb {
                feature_log_prob, ..
            } => feature_log_prob.iter().map(Vec::len).collect(),
        }
    }
}

fn dot(weights: &[f64], row: &SparseVector) -> f64 {
    row.iter()
        .map(|&(index, value)| weights.get(index).copied().unwrap_or(0.0) * value)
        .sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// A fitted vectorizer and classifier pair, as written by the training
/// tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub vectorizer: TfidfVectorizer,
    pub classifier: ProbabilisticModel,
}

impl ModelArtifact {
    /// Read an artifact from disk. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ModelLoadError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map(Some)
    }

    pub fn from_json(content: &str) -> Result<Self, ModelLoadError> {
        let artifact: ModelArtifact = serde_json::from_str(content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        let params = self.vectorizer.params();
        let n_features = self.vectorizer.n_features();

        if n_features == 0 {
            return Err(ModelLoadError::Shape("vocabulary is empty".to_string()));
        }
        if let Some((term, index)) = params
            .vocabulary
            .iter()
            .find(|(_, index)| **index >= n_features)
        {
            return Err(ModelLoadError::Shape(format!(
                "term {term:?} has index {index} outside 0..{n_features}"
            )));
        }
        if let Some(idf) = &params.idf {
            if idf.len() != n_features {
                return Err(ModelLoadError::Shape(format!(
                    "idf has {} entries, vocabulary has {}",
                    idf.len(),
                    n_features
                )));
            }
        }
        let (min_n, max_n) = params.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ModelLoadError::Shape(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }
        for dimension in self.classifier.dimensions() {
            if dimension != n_features {
                return Err(ModelLoadError::Shape(format!(
                    "classifier expects {dimension} features, vectorizer produces {n_features}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelArtifact::from_file(&dir.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let artifact = json!({
            "vectorizer": {"vocabulary": {"bank": 0, "lunch": 1}},
            "classifier": {"type": "logistic_regression", "coef": [2.0, -2.0], "intercept": 0.0}
        });
        write!(file, "{}", artifact).unwrap();

        let loaded = ModelArtifact::from_file(file.path()).unwrap().unwrap();
        assert_eq!(loaded.vectorizer.n_features(), 2);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            ModelArtifact::from_json("{not json"),
            Err(ModelLoadError::Parse(_))
        ));
        assert!(matches!(
            ModelArtifact::from_json(r#"{"vectorizer": {"vocabulary": {"a": 0}}, "classifier": {"type": "svm"}}"#),
            Err(ModelLoadError::Parse(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let artifact = json!({
            "vectorizer": {"vocabulary": {"bank": 0, "lunch": 1}},
            "classifier": {"type": "logistic_regression", "coef": [1.0], "intercept": 0.0}
        });
        assert!(matches!(
            ModelArtifact::from_json(&artifact.to_string()),
            Err(ModelLoadError::Shape(_))
        ));

        let artifact = json!({
            "vectorizer": {"vocabulary": {"bank": 0, "lunch": 5}},
            "classifier": {"type": "logistic_regression", "coef": [1.0, 1.0], "intercept": 0.0}
        });
        assert!(matches!(
            ModelArtifact::from_json(&artifact.to_string()),
            Err(ModelLoadError::Shape(_))
        ));

        let artifact = json!({
            "vectorizer": {"vocabulary": {"bank": 0}, "idf": [1.0, 2.0]},
            "classifier": {"type": "logistic_regression", "coef": [1.0], "intercept": 0.0}
        });
        assert!(matches!(
            ModelArtifact::from_json(&artifact.to_string()),
            Err(ModelLoadError::Shape(_))
        ));
    }

    #[test]
    fn test_logistic_probability() {
        let model = ProbabilisticModel::LogisticRegression {
            coef: vec![2.0, -1.0],
            intercept: -0.5,
        };
        assert_close(model.spam_probability(&vec![]), 1.0 / (1.0 + 0.5f64.exp()));
        assert_close(
            model.spam_probability(&vec![(0, 1.0), (1, 0.5)]),
            1.0 / (1.0 + (-1.0f64).exp()),
        );
        // Large magnitudes stay finite
        let extreme = ProbabilisticModel::LogisticRegression {
            coef: vec![1000.0],
            intercept: 0.0,
        };
        assert_close(extreme.spam_probability(&vec![(0, 1.0)]), 1.0);
        assert_close(extreme.spam_probability(&vec![(0, -1.0)]), 0.0);
    }

    #[test]
    fn test_naive_bayes_probability() {
        let model = ProbabilisticModel::MultinomialNb {
            class_log_prior: [0.5f64.ln(), 0.5f64.ln()],
            feature_log_prob: [
                vec![0.8f64.ln(), 0.2f64.ln()],
                vec![0.2f64.ln(), 0.8f64.ln()],
            ],
        };
        // Equal priors, no evidence
        assert_close(model.spam_probability(&vec![]), 0.5);
        // One occurrence of the spammy feature: 0.8 / (0.8 + 0.2)
        assert_close(model.spam_probability(&vec![(1, 1.0)]), 0.8);
        assert_close(model.spam_probability(&vec![(0, 1.0)]), 0.2);
    }
}
