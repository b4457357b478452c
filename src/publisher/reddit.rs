//! Reddit self-post publisher
//!
//! Authenticates with the OAuth password grant (script apps) and submits a
//! self post with reply notifications disabled. The access token is cached
//! until shortly before it expires.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::USER_AGENT, Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::content::Content;
use crate::publisher::{PublishReceipt, Publisher};
use crate::utils::error::PublishError;

/// Refresh tokens this long before Reddit expires them
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for the Reddit API
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub subreddit: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    /// Token endpoint host, `https://www.reddit.com`
    pub auth_url: String,
    /// API host, `https://oauth.reddit.com`
    pub api_url: String,
    pub request_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: format!("matchday/{} (match thread bot)", env!("CARGO_PKG_VERSION")),
            auth_url: "https://www.reddit.com".to_string(),
            api_url: "https://oauth.reddit.com".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    json: SubmitJson,
}

#[derive(Debug, Deserialize)]
struct SubmitJson {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<SubmitData>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    name: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Publishes announcements as Reddit self posts
pub struct RedditPublisher {
    client: Client,
    config: PublisherConfig,
    token: Mutex<Option<AccessToken>>,
}

impl RedditPublisher {
    pub fn new(config: PublisherConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    async fn access_token(&self) -> Result<String, PublishError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.expires_at) {
            return Ok(token.value.clone());
        }

        let response = self
            .client
            .post(format!("{}/api/v1/access_token", self.config.auth_url))
            .header(USER_AGENT, &self.config.user_agent)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PublishError::Auth(format!("token request returned {status}")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PublishError::Transient(format!("token request returned {status}")));
        }
        if !status.is_success() {
            return Err(PublishError::Auth(format!("token request returned {status}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Auth(format!("malformed token response: {e}")))?;

        let value = match (body.access_token, body.error) {
            (Some(token), None) => token,
            (_, Some(error)) => return Err(PublishError::Auth(error)),
            (None, None) => return Err(PublishError::Auth("no access token returned".to_string())),
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });

        tracing::debug!(username = %self.config.username, "Reddit access token obtained");
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

/// Classify the `json.errors` array of a submit response
fn submit_error(errors: &[Vec<serde_json::Value>]) -> Option<PublishError> {
    let first = errors.first()?;
    let code = first.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
    let message = first.get(1).and_then(|v| v.as_str()).unwrap_or_default();

    if code == "RATELIMIT" {
        Some(PublishError::Transient(format!("{code}: {message}")))
    } else {
        Some(PublishError::Rejected(format!("{code}: {message}")))
    }
}

#[async_trait]
impl Publisher for RedditPublisher {
    async fn publish(&self, content: &Content) -> Result<PublishReceipt, PublishError> {
        let token = self.access_token().await?;

        tracing::info!(subreddit = %self.config.subreddit, title = %content.title, "Submitting thread");

        let response = self
            .client
            .post(format!("{}/api/submit", self.config.api_url))
            .header(USER_AGENT, &self.config.user_agent)
            .bearer_auth(token)
            .form(&[
                ("api_type", "json"),
                ("kind", "self"),
                ("sr", self.config.subreddit.as_str()),
                ("title", content.title.as_str()),
                ("text", content.body.as_str()),
                ("sendreplies", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_token().await;
            return Err(PublishError::Auth(format!("submit returned {status}")));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PublishError::Transient(format!("submit returned {status}")));
        }
        if !status.is_success() {
            return Err(PublishError::Rejected(format!("submit returned {status}")));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Rejected(format!("malformed submit response: {e}")))?;

        if let Some(err) = submit_error(&body.json.errors) {
            return Err(err);
        }

        let data = body.json.data.unwrap_or(SubmitData {
            name: None,
            url: None,
        });
        tracing::info!(url = ?data.url, "Thread posted");

        Ok(PublishReceipt {
            id: data.name,
            url: data.url,
            dry_run: false,
        })
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
