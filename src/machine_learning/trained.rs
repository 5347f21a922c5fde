use super::artifact::ModelArtifact;
use super::{ModelNotLoadedError, Prediction, SpamClassifier};
use crate::features::FeatureBundle;
use log::{info, warn};
use std::path::Path;

/// Load state of the trained model. `Loaded` is terminal: nothing replaces
/// the artifact once it has been read at startup.
#[derive(Debug)]
pub enum ModelState {
    Unloaded,
    Loaded(Box<ModelArtifact>),
}

/// Statistical classifier backed by a fitted vectorizer and model.
#[derive(Debug)]
pub struct TrainedClassifier {
    state: ModelState,
}

impl TrainedClassifier {
    pub fn unloaded() -> Self {
        Self {
            state: ModelState::Unloaded,
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            state: ModelState::Loaded(Box::new(artifact)),
        }
    }

    /// Load the artifact at `path`. A missing or unusable artifact leaves
    /// the classifier unloaded; the outcome is logged either way.
    pub fn load(path: &Path) -> Self {
        match ModelArtifact::from_file(path) {
            Ok(Some(artifact)) => {
                info!(
                    "Loaded model artifact from {} ({} features)",
                    path.display(),
                    artifact.vectorizer.n_features()
                );
                Self::from_artifact(artifact)
            }
            Ok(None) => {
                info!("No model artifact at {}", path.display());
                Self::unloaded()
            }
            Err(e) => {
                warn!("Ignoring model artifact at {}: {}", path.display(), e);
                Self::unloaded()
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }
}

impl SpamClassifier for TrainedClassifier {
    fn predict_batch(&self, bundles: &[FeatureBundle]) -> Result<Vec<Prediction>, ModelNotLoadedError> {
        let ModelState::Loaded(model) = &self.state else {
            return Err(ModelNotLoadedError);
        };

        let texts: Vec<&str> = bundles
            .iter()
            .map(|bundle| bundle.normalized_text.as_str())
            .collect();

        Ok(model
            .vectorizer
            .transform(&texts)
            .iter()
            .map(|row| Prediction::from_probability(model.classifier.spam_probability(row)))
            .collect())
    }

    fn name(&self) -> &str {
        "ml"
    }
}
