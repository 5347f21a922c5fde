pub mod oauth;

use crate::email::RawEmail;
use crate::normalization::TextNormalizer;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use log::{debug, info};
use oauth::{OAuthClient, OAuthToken, TokenStore, GMAIL_READONLY_SCOPE};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Gmail emits URL-safe base64, with or without padding.
const BASE64_URL_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not authenticated: no stored OAuth token")]
    NotAuthenticated,
    #[error("required scope missing: {0}")]
    ScopeMissing(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gmail API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid message id {0:?}")]
    InvalidMessageId(String),
    #[error("OAuth error: {0}")]
    OAuth(String),
    #[error("token store error: {0}")]
    TokenStore(String),
}

/// Supplies raw messages for a scan, in provider order.
pub trait MailSource {
    fn list_message_ids(
        &self,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;

    fn fetch_message(&self, id: &str) -> impl Future<Output = Result<RawEmail, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GmailSettings {
    pub api_base: String,
    pub user_id: String,
    pub label: String,
    pub timeout: Duration,
}

impl Default for GmailSettings {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            user_id: "me".to_string(),
            label: "INBOX".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Entry point to the Gmail API: turns a stored token into an authorized
/// session.
pub struct GmailClient {
    http: Client,
    settings: GmailSettings,
    oauth: OAuthClient,
    token_store: TokenStore,
}

impl GmailClient {
    pub fn new(http: Client, settings: GmailSettings, oauth: OAuthClient, token_store: TokenStore) -> Self {
        Self {
            http,
            settings,
            oauth,
            token_store,
        }
    }

    /// Load the stored token, refreshing and re-saving it when expired, and
    /// require read-only Gmail scope.
    pub async fn authorize(&self) -> Result<GmailSession, FetchError> {
        let mut token = self
            .token_store
            .load()?
            .ok_or(FetchError::NotAuthenticated)?;

        if token.is_expired() {
            token = self.oauth.refresh(&token).await?;
            self.token_store.save(&token)?;
        }
        ensure_scope(&token)?;

        Ok(GmailSession {
            http: self.http.clone(),
            settings: self.settings.clone(),
            access_token: token.access_token,
            normalizer: TextNormalizer::new(),
        })
    }
}

fn ensure_scope(token: &OAuthToken) -> Result<(), FetchError> {
    if token.has_scope(GMAIL_READONLY_SCOPE) {
        Ok(())
    } else {
        Err(FetchError::ScopeMissing(GMAIL_READONLY_SCOPE.to_string()))
    }
}

/// Gmail access with a valid bearer token.
pub struct GmailSession {
    http: Client,
    settings: GmailSettings,
    access_token: String,
    normalizer: TextNormalizer,
}

impl GmailSession {
    fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/messages",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.user_id
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(self.settings.timeout)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl MailSource for GmailSession {
    async fn list_message_ids(&self, max_results: usize) -> Result<Vec<String>, FetchError> {
        let max = max_results.to_string();
        let list: MessageList = self
            .get_json(
                &self.messages_url(),
                &[("labelIds", self.settings.label.as_str()), ("maxResults", max.as_str())],
            )
            .await?;

        let ids: Vec<String> = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect();
        info!("Listed {} messages in {}", ids.len(), self.settings.label);
        Ok(ids)
    }

    async fn fetch_message(&self, id: &str) -> Result<RawEmail, FetchError> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(FetchError::InvalidMessageId(id.to_string()));
        }
        debug!("Fetching message {}", id);
        let url = format!("{}/{}", self.messages_url(), id);
        let message: GmailMessage = self.get_json(&url, &[("format", "full")]).await?;
        Ok(message.into_raw_email(id, &self.normalizer))
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GmailMessage {
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
}

impl GmailMessage {
    /// Flatten a `format=full` message into a RawEmail.
    pub fn into_raw_email(self, id: &str, normalizer: &TextNormalizer) -> RawEmail {
        let payload = self.payload.unwrap_or_default();

        let mut texts = Vec::new();
        if payload.parts.is_empty() {
            texts.push(part_text(&payload, normalizer));
        } else {
            collect_text_parts(&payload.parts, normalizer, &mut texts);
        }
        let body = texts
            .iter()
            .flat_map(|text| text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");

        RawEmail {
            id: id.to_string(),
            subject: header_value(&payload.headers, "Subject"),
            sender: header_value(&payload.headers, "From"),
            date: header_value(&payload.headers, "Date"),
            body: if body.is_empty() { self.snippet } else { body },
        }
    }
}

/// Text parts in document order, descending into multipart containers.
fn collect_text_parts(parts: &[MessagePart], normalizer: &TextNormalizer, texts: &mut Vec<String>) {
    for part in parts {
        if part.mime_type.starts_with("text/") {
            texts.push(part_text(part, normalizer));
        } else if !part.parts.is_empty() {
            collect_text_parts(&part.parts, normalizer, texts);
        }
    }
}

fn part_text(part: &MessagePart, normalizer: &TextNormalizer) -> String {
    match part.body.as_ref().and_then(|body| body.data.as_deref()) {
        Some(data) => normalizer.visible_text(&decode_base64url(data)),
        None => String::new(),
    }
}

/// Decode base64url part data; undecodable input yields an empty string and
/// invalid UTF-8 sequences are dropped.
pub fn decode_base64url(data: &str) -> String {
    match BASE64_URL_LENIENT.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""),
        Err(e) => {
            debug!("Undecodable part data: {}", e);
            String::new()
        }
    }
}

fn header_value(headers: &[Header], name: &str) -> String {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
    use serde_json::json;

    fn parse(message: serde_json::Value) -> RawEmail {
        let message: GmailMessage = serde_json::from_value(message).unwrap();
        message.into_raw_email("msg-1", &TextNormalizer::new())
    }

    #[test]
    fn test_decode_base64url_with_and_without_padding() {
        let padded = URL_SAFE.encode("Hi?>");
        let unpadded = URL_SAFE_NO_PAD.encode("Hi?>");
        assert_ne!(padded, unpadded);
        assert_eq!(decode_base64url(&padded), "Hi?>");
        assert_eq!(decode_base64url(&unpadded), "Hi?>");
        assert_eq!(decode_base64url("!!!not base64!!!"), "");
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let data = URL_SAFE_NO_PAD.encode([b'o', b'k', 0xff, b'!']);
        assert_eq!(decode_base64url(&data), "ok!");
    }

    #[test]
    fn test_multipart_message_is_flattened() {
        let email = parse(json!({
            "snippet": "snippet text",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "Subject", "value": "Your invoice"},
                    {"name": "From", "value": "Billing <billing@example.com>"},
                    {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 +0000"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": URL_SAFE_NO_PAD.encode("Plain\n\n  part")}},
                            {"mimeType": "text/html", "body": {"data": URL_SAFE_NO_PAD.encode("<p>Html <b>part</b></p>")}}
                        ]
                    },
                    {"mimeType": "application/pdf", "body": {"attachmentId": "att-1"}}
                ]
            }
        }));

        assert_eq!(email.id, "msg-1");
        assert_eq!(email.subject, "Your invoice");
        assert_eq!(email.sender, "Billing <billing@example.com>");
        assert_eq!(email.date, "Mon, 1 Jan 2024 10:00:00 +0000");
        assert_eq!(email.body, "Plain part Html part");
    }

    #[test]
    fn test_single_part_payload() {
        let email = parse(json!({
            "payload": {
                "mimeType": "text/html",
                "headers": [{"name": "subject", "value": "lowercase header"}],
                "body": {"data": URL_SAFE.encode("<div>Click <a href='x'>here</a></div>")}
            }
        }));
        assert_eq!(email.subject, "lowercase header");
        assert_eq!(email.body, "Click here");
        assert_eq!(email.sender, "");
    }

    #[test]
    fn test_snippet_used_when_body_is_empty() {
        let email = parse(json!({
            "snippet": "Preview only",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [{"mimeType": "image/png", "body": {"attachmentId": "a"}}]
            }
        }));
        assert_eq!(email.body, "Preview only");

        let email = parse(json!({"snippet": "No payload at all"}));
        assert_eq!(email.body, "No payload at all");
    }

    #[test]
    fn test_scope_is_required() {
        let mut token = OAuthToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: vec!["openid".to_string()],
        };
        assert!(matches!(ensure_scope(&token), Err(FetchError::ScopeMissing(_))));
        token.scopes.push(GMAIL_READONLY_SCOPE.to_string());
        assert!(ensure_scope(&token).is_ok());
    }

    #[tokio::test]
    async fn test_authorize_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let http = Client::new();
        let oauth = OAuthClient::new(http.clone(), "id", Some("secret".to_string()), "https://x.example/cb");
        let client = GmailClient::new(
            http,
            GmailSettings::default(),
            oauth,
            TokenStore::new(dir.path().join("token.json")),
        );
        assert!(matches!(client.authorize().await, Err(FetchError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_invalid_message_id_is_rejected_before_request() {
        let session = GmailSession {
            http: Client::new(),
            settings: GmailSettings {
                api_base: "http://127.0.0.1:9".to_string(),
                ..GmailSettings::default()
            },
            access_token: "token".to_string(),
            normalizer: TextNormalizer::new(),
        };
        assert!(matches!(
            session.fetch_message("../labels").await,
            Err(FetchError::InvalidMessageId(_))
        ));
    }
}
