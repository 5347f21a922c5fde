pub mod config;
pub mod email;
pub mod features;
pub mod gmail;
pub mod machine_learning;
pub mod normalization;
pub mod scanner;

pub use config::Config;
pub use email::RawEmail;
pub use features::{FeatureBundle, FeatureExtractor};
pub use machine_learning::{Classifier, Label, ModelTag, Prediction, SpamClassifier};
pub use normalization::TextNormalizer;
pub use scanner::{Pipeline, ScanError, ScanResult, Scanner};
