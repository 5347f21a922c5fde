use super::{Prediction, SpamClassifier};
use crate::features::FeatureBundle;

const KEYWORD_WEIGHT: f64 = 0.25;
const CAPITAL_WEIGHT: f64 = 0.5;
const LINK_WEIGHT: f64 = 0.25;
const MAX_KEYWORDS: usize = 5;
const MAX_LINKS: usize = 5;
/// A capital ratio of 0.2 already earns the full capital term.
const CAPITAL_AMPLIFIER: f64 = 5.0;
const SPAM_THRESHOLD: f64 = 1.0;
const CONFIDENCE_DIVISOR: f64 = 2.0;

/// Rule-based scorer that needs no trained artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Unnormalized score in [0, 3]: each term is clamped before weighting.
    pub fn raw_score(&self, bundle: &FeatureBundle) -> f64 {
        let keywords = bundle.keyword_count.min(MAX_KEYWORDS) as f64;
        let capitals = (bundle.capital_ratio * CAPITAL_AMPLIFIER).clamp(0.0, 1.0);
        let links = bundle.link_count.min(MAX_LINKS) as f64;

        KEYWORD_WEIGHT * keywords + CAPITAL_WEIGHT * capitals + LINK_WEIGHT * links
    }

    pub fn predict(&self, bundle: &FeatureBundle) -> Prediction {
        let score = self.raw_score(bundle);
        let confidence = (score / CONFIDENCE_DIVISOR).min(1.0);
        if score >= SPAM_THRESHOLD {
            Prediction::spam(confidence)
        } else {
            Prediction::ham(confidence)
        }
    }
}

impl SpamClassifier for HeuristicClassifier {
    fn predict_batch(
        &self,
        bundles: &[FeatureBundle],
    ) -> Result<Vec<Prediction>, super::ModelNotLoadedError> {
        Ok(bundles.iter().map(|bundle| self.predict(bundle)).collect())
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_learning::Label;

    fn bundle(keyword_count: usize, capital_ratio: f64, link_count: usize) -> FeatureBundle {
        FeatureBundle {
            keyword_count,
            capital_ratio,
            link_count,
            ..FeatureBundle::default()
        }
    }

    #[test]
    fn test_empty_bundle_is_ham_with_zero_score() {
        let prediction = HeuristicClassifier::new().predict(&FeatureBundle::default());
        assert_eq!(prediction.label, Label::Ham);
        assert_eq!(prediction.score, 0.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let classifier = HeuristicClassifier::new();

        // 4 keywords alone reach exactly 1.0
        let prediction = classifier.predict(&bundle(4, 0.0, 0));
        assert_eq!(prediction.label, Label::Spam);
        assert_eq!(prediction.score, 0.5);

        let prediction = classifier.predict(&bundle(3, 0.0, 0));
        assert_eq!(prediction.label, Label::Ham);
        assert_eq!(prediction.score, 0.375);
    }

    #[test]
    fn test_terms_are_clamped() {
        let classifier = HeuristicClassifier::new();
        let saturated = classifier.raw_score(&bundle(5, 0.2, 5));
        assert_eq!(classifier.raw_score(&bundle(50, 1.0, 500)), saturated);
        assert_eq!(saturated, 3.0);

        let prediction = classifier.predict(&bundle(50, 1.0, 500));
        assert_eq!(prediction.score, 1.0);
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let classifier = HeuristicClassifier::new();
        for keywords in 0..8 {
            for links in 0..8 {
                for ratio in [0.0, 0.05, 0.1, 0.19, 0.2, 0.5, 1.0] {
                    let b = bundle(keywords, ratio, links);
                    let raw = classifier.raw_score(&b);
                    assert!((0.0..=3.0).contains(&raw));
                    let prediction = classifier.predict(&b);
                    assert!((0.0..=1.0).contains(&prediction.score));
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_each_signal() {
        let classifier = HeuristicClassifier::new();
        let ratios = [0.0, 0.01, 0.1, 0.15, 0.2, 0.3, 1.0];

        for base_links in 0..7 {
            for base_keywords in 0..7 {
                for pair in ratios.windows(2) {
                    let low = classifier.raw_score(&bundle(base_keywords, pair[0], base_links));
                    let high = classifier.raw_score(&bundle(base_keywords, pair[1], base_links));
                    assert!(high >= low);
                }
                let low = classifier.raw_score(&bundle(base_keywords, 0.1, base_links));
                assert!(classifier.raw_score(&bundle(base_keywords + 1, 0.1, base_links)) >= low);
                assert!(classifier.raw_score(&bundle(base_keywords, 0.1, base_links + 1)) >= low);
            }
        }
    }

    #[test]
    fn test_batch_preserves_order() {
        let classifier = HeuristicClassifier::new();
        let bundles = vec![bundle(5, 1.0, 5), bundle(0, 0.0, 0), bundle(4, 0.0, 0)];
        let predictions = classifier.predict_batch(&bundles).unwrap();

        let labels: Vec<Label> = predictions.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![Label::Spam, Label::Ham, Label::Spam]);
        assert!(classifier.predict_batch(&[]).unwrap().is_empty());
    }
}
