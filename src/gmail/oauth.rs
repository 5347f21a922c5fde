use super::FetchError;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
/// Refresh this many seconds before the recorded expiry.
const EXPIRY_MARGIN_SECONDS: u64 = 60;
const DEFAULT_EXPIRES_IN: u64 = 3600;

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` means unknown and is treated as expired.
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthToken {
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires_at) => now + EXPIRY_MARGIN_SECONDS >= expires_at,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_seconds())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous: Option<&OAuthToken>) -> Result<OAuthToken, FetchError> {
        if let Some(error) = self.error {
            let description = self.error_description.unwrap_or_default();
            return Err(FetchError::OAuth(format!("{error}: {description}")));
        }
        let access_token = self
            .access_token
            .ok_or_else(|| FetchError::OAuth("token response has no access_token".to_string()))?;

        // Google omits the refresh token and sometimes the scope on refresh.
        let refresh_token = self
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        let scopes = match self.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => previous.map(|p| p.scopes.clone()).unwrap_or_default(),
        };

        Ok(OAuthToken {
            access_token,
            refresh_token,
            expires_at: Some(now_seconds() + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
            scopes,
        })
    }
}

/// Google OAuth2 web-client flow: consent URL, code exchange, refresh.
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Consent URL requesting offline, read-only Gmail access.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(AUTH_ENDPOINT)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", GMAIL_READONLY_SCOPE)
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent")
                .append_pair("include_granted_scopes", "true");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    fn client_secret(&self) -> Result<&str, FetchError> {
        self.client_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| FetchError::OAuth("OAuth client secret is not configured".to_string()))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken, FetchError> {
        if code.trim().is_empty() {
            return Err(FetchError::OAuth("no authorization code received".to_string()));
        }
        debug!("Exchanging authorization code for tokens");
        let response: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code.trim()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret()?),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;
        response.into_token(None)
    }

    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, FetchError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(FetchError::NotAuthenticated)?;
        debug!("Refreshing Gmail access token");
        let response: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret()?),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?
            .json()
            .await?;
        response.into_token(Some(token))
    }
}

/// Token persistence: a single JSON document, owner-readable only.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<OAuthToken>, FetchError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            FetchError::TokenStore(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let token = serde_json::from_str(&content).map_err(|e| {
            FetchError::TokenStore(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &OAuthToken) -> Result<(), FetchError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FetchError::TokenStore(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let content = serde_json::to_string_pretty(token)
            .map_err(|e| FetchError::TokenStore(format!("failed to encode token: {e}")))?;
        std::fs::write(&self.path, content).map_err(|e| {
            FetchError::TokenStore(format!("failed to write {}: {e}", self.path.display()))
        })?;
        restrict_permissions(&self.path);
        info!("Saved OAuth token to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored token. Returns whether one existed.
    pub fn delete(&self) -> Result<bool, FetchError> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).map_err(|e| {
            FetchError::TokenStore(format!("failed to remove {}: {e}", self.path.display()))
        })?;
        Ok(true)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("Failed to restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
