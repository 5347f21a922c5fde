pub mod artifact;
pub mod heuristic;
pub mod trained;
pub mod vectorizer;

use crate::features::FeatureBundle;
use heuristic::HeuristicClassifier;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use trained::TrainedClassifier;

/// Probability at or above which the trained model reports spam.
const PROBABILITY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Spam,
    Ham,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Spam => write!(f, "spam"),
            Label::Ham => write!(f, "ham"),
        }
    }
}

/// A label plus the confidence, in [0, 1], that the message is spam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub score: f64,
}

impl Prediction {
    pub fn spam(score: f64) -> Self {
        Self {
            label: Label::Spam,
            score,
        }
    }

    pub fn ham(score: f64) -> Self {
        Self {
            label: Label::Ham,
            score,
        }
    }

    pub fn from_probability(probability: f64) -> Self {
        let score = probability.clamp(0.0, 1.0);
        if score >= PROBABILITY_THRESHOLD {
            Self::spam(score)
        } else {
            Self::ham(score)
        }
    }

    pub fn is_spam(&self) -> bool {
        self.label == Label::Spam
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("model not loaded: place a trained model artifact at the configured model path")]
pub struct ModelNotLoadedError;

/// Anything that can label a batch of feature bundles. Output has the
/// same length and order as the input.
pub trait SpamClassifier: Send + Sync {
    fn predict_batch(&self, bundles: &[FeatureBundle]) -> Result<Vec<Prediction>, ModelNotLoadedError>;
    fn name(&self) -> &str;
}

/// Which classifier produced a scan's predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTag {
    Ml,
    Heuristic,
}

/// What to do at startup when no trained model could be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Classify with the heuristic scorer.
    #[default]
    Heuristic,
    /// Keep the unloaded model so every scan reports `model_not_loaded`.
    Error,
}

/// The classifier variant chosen once at startup.
#[derive(Debug)]
pub enum Classifier {
    Trained(TrainedClassifier),
    Heuristic(HeuristicClassifier),
}

impl Classifier {
    pub fn select(trained: TrainedClassifier, policy: FallbackPolicy) -> Self {
        if trained.is_loaded() {
            info!("Classifying with the trained model");
            return Classifier::Trained(trained);
        }

        match policy {
            FallbackPolicy::Heuristic => {
                warn!("No trained model loaded, falling back to heuristic scoring");
                Classifier::Heuristic(HeuristicClassifier::new())
            }
            FallbackPolicy::Error => {
                warn!("No trained model loaded, scans will fail with model_not_loaded");
                Classifier::Trained(trained)
            }
        }
    }

    /// False only for an unloaded trained model.
    pub fn is_ready(&self) -> bool {
        match self {
            Classifier::Trained(trained) => trained.is_loaded(),
            Classifier::Heuristic(_) => true,
        }
    }

    pub fn model_tag(&self) -> ModelTag {
        match self {
            Classifier::Trained(_) => ModelTag::Ml,
            Classifier::Heuristic(_) => ModelTag::Heuristic,
        }
    }

    fn inner(&self) -> &dyn SpamClassifier {
        match self {
            Classifier::Trained(trained) => trained,
            Classifier::Heuristic(heuristic) => heuristic,
        }
    }
}

impl SpamClassifier for Classifier {
    fn predict_batch(&self, bundles: &[FeatureBundle]) -> Result<Vec<Prediction>, ModelNotLoadedError> {
        self.inner().predict_batch(bundles)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_threshold() {
        assert_eq!(Prediction::from_probability(0.5).label, Label::Spam);
        assert_eq!(Prediction::from_probability(0.4999).label, Label::Ham);
        assert_eq!(Prediction::from_probability(0.93).score, 0.93);
    }

    #[test]
    fn test_unloaded_model_falls_back_to_heuristic() {
        let classifier = Classifier::select(TrainedClassifier::unloaded(), FallbackPolicy::Heuristic);
        assert_eq!(classifier.model_tag(), ModelTag::Heuristic);
        assert!(classifier.is_ready());

        let predictions = classifier.predict_batch(&[FeatureBundle::default()]).unwrap();
        assert_eq!(predictions, vec![Prediction::ham(0.0)]);
    }

    #[test]
    fn test_unloaded_model_with_error_policy() {
        let classifier = Classifier::select(TrainedClassifier::unloaded(), FallbackPolicy::Error);
        assert_eq!(classifier.model_tag(), ModelTag::Ml);
        assert!(!classifier.is_ready());
        assert_eq!(
            classifier.predict_batch(&[FeatureBundle::default()]),
            Err(ModelNotLoadedError)
        );
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&ModelTag::Ml).unwrap(), "\"ml\"");
        assert_eq!(serde_json::to_string(&ModelTag::Heuristic).unwrap(), "\"heuristic\"");
        assert_eq!(
            serde_json::to_value(Prediction::spam(0.75)).unwrap(),
            serde_json::json!({"label": "spam", "score": 0.75})
        );
        let policy: FallbackPolicy = serde_yaml::from_str("error").unwrap();
        assert_eq!(policy, FallbackPolicy::Error);
    }
}
