use crate::email::RawEmail;
use crate::features::{FeatureBundle, FeatureExtractor};
use crate::gmail::{FetchError, MailSource};
use crate::machine_learning::{Classifier, ModelNotLoadedError, ModelTag, Prediction, SpamClassifier};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const MAX_RESULTS_CEILING: usize = 500;

/// One classified message as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedEmail {
    #[serde(flatten)]
    pub email: RawEmail,
    #[serde(flatten)]
    pub features: FeatureBundle,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub emails: Vec<ScannedEmail>,
    pub model: ModelTag,
}

impl ScanResult {
    pub fn spam_count(&self) -> usize {
        self.emails.iter().filter(|e| e.prediction.is_spam()).count()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("required scope missing: {0}")]
    ScopeMissing(String),
    #[error(transparent)]
    ModelNotLoaded(#[from] ModelNotLoadedError),
    #[error("fetch failed: {0}")]
    Fetch(FetchError),
}

impl From<FetchError> for ScanError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotAuthenticated => ScanError::NotAuthenticated,
            FetchError::ScopeMissing(scope) => ScanError::ScopeMissing(scope),
            other => ScanError::Fetch(other),
        }
    }
}

impl ScanError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::NotAuthenticated => "not_authenticated",
            ScanError::ScopeMissing(_) => "required_scope_missing",
            ScanError::ModelNotLoaded(_) => "model_not_loaded",
            ScanError::Fetch(_) => "fetch_failed",
        }
    }

    /// HTTP status a web front end would answer with.
    pub fn status(&self) -> u16 {
        match self {
            ScanError::NotAuthenticated => 401,
            ScanError::ScopeMissing(_) => 403,
            ScanError::ModelNotLoaded(_) => 503,
            ScanError::Fetch(_) => 502,
        }
    }
}

/// Feature extraction followed by classification, with no I/O.
pub struct Pipeline {
    extractor: FeatureExtractor,
    classifier: Classifier,
}

impl Pipeline {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            classifier,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn classify(&self, emails: Vec<RawEmail>) -> Result<ScanResult, ModelNotLoadedError> {
        let features = self.extractor.extract_batch(&emails);
        let predictions = self.classifier.predict_batch(&features)?;

        let emails = emails
            .into_iter()
            .zip(features)
            .zip(predictions)
            .map(|((email, features), prediction)| ScannedEmail {
                email,
                features,
                prediction,
            })
            .collect();

        Ok(ScanResult {
            emails,
            model: self.classifier.model_tag(),
        })
    }
}

/// Fetches a batch from a mail source and classifies it.
pub struct Scanner<'a, S: MailSource> {
    source: S,
    pipeline: &'a Pipeline,
}

impl<'a, S: MailSource> Scanner<'a, S> {
    pub fn new(source: S, pipeline: &'a Pipeline) -> Self {
        Self { source, pipeline }
    }

    /// Scan up to `max_results` messages, clamped to 1..=500.
    pub async fn scan(&self, max_results: usize) -> Result<ScanResult, ScanError> {
        if !self.pipeline.classifier().is_ready() {
            return Err(ModelNotLoadedError.into());
        }

        let max_results = max_results.clamp(1, MAX_RESULTS_CEILING);
        info!(
            "Starting scan of up to {} messages with {} classifier",
            max_results,
            self.pipeline.classifier().name()
        );

        let ids = self.source.list_message_ids(max_results).await?;
        let mut emails = Vec::with_capacity(ids.len());
        for id in ids.iter().take(max_results) {
            emails.push(self.source.fetch_message(id).await?);
        }
        debug!("Fetched {} messages", emails.len());

        let result = self.pipeline.classify(emails)?;
        info!(
            "Scan finished: {} messages, {} flagged as spam",
            result.emails.len(),
            result.spam_count()
        );
        Ok(result)
    }
}
