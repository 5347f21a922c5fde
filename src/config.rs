use crate::gmail::GMAIL_API_BASE;
use crate::machine_learning::FallbackPolicy;
use crate::scanner::DEFAULT_MAX_RESULTS;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub scan: ScanConfig,
    pub gmail: GmailConfig,
    pub oauth: OAuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON model artifact; absent means heuristic-only (or an error, per `fallback`).
    pub path: String,
    pub fallback: FallbackPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "model.json".to_string(),
            fallback: FallbackPolicy::Heuristic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_results: usize,
    pub label: String,
    pub user_id: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            label: "INBOX".to_string(),
            user_id: "me".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub token_path: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: redirect_for_frontend("http://localhost:3000"),
            token_path: "token.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Unknown level names fall back to Info.
    pub fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::Info)
    }
}

fn redirect_for_frontend(frontend_url: &str) -> String {
    format!("{}/dashboard/oauth2callback", frontend_url.trim_end_matches('/'))
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored. An explicit
    /// `GOOGLE_REDIRECT_URI` wins over one derived from `FRONTEND_URL`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = get("MODEL_PATH") {
            self.model.path = path;
        }
        if let Some(id) = get("GOOGLE_CLIENT_ID") {
            self.oauth.client_id = id;
        }
        if let Some(secret) = get("GOOGLE_CLIENT_SECRET") {
            self.oauth.client_secret = Some(secret);
        }
        if let Some(frontend) = get("FRONTEND_URL") {
            self.oauth.redirect_uri = redirect_for_frontend(&frontend);
        }
        if let Some(redirect) = get("GOOGLE_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect;
        }
        if let Some(path) = get("TOKEN_PATH") {
            self.oauth.token_path = path;
        }
    }

    /// Problems that would make a scan fail before it starts.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.scan.max_results == 0 {
            problems.push("scan.max_results must be at least 1".to_string());
        }
        if self.scan.label.trim().is_empty() {
            problems.push("scan.label must not be empty".to_string());
        }
        if self.gmail.timeout_seconds == 0 {
            problems.push("gmail.timeout_seconds must be at least 1".to_string());
        }
        if url::Url::parse(&self.gmail.api_base).is_err() {
            problems.push(format!("gmail.api_base is not a URL: {}", self.gmail.api_base));
        }
        if url::Url::parse(&self.oauth.redirect_uri).is_err() {
            problems.push(format!(
                "oauth.redirect_uri is not a URL: {}",
                self.oauth.redirect_uri
            ));
        }
        problems
    }
}
