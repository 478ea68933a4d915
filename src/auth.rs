//! Refresh-token supply for validation calls.
//!
//! Only validation submit and status calls need a refresh token. It is
//! obtained from IAM by exchanging an API key and cached until shortly
//! before it expires.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::AuthConfig;
use crate::error::{CatalogError, Result};

const TOKEN_PATH: &str = "/identity/token";
const APIKEY_GRANT: &str = "urn:ibm:params:oauth:grant-type:apikey";

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh_token(&self) -> Result<String>;
}

/// A token the caller already holds.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn refresh_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(token: String, expires_in: Duration, margin: Duration, now: Instant) -> Self {
        Self {
            token,
            refresh_at: now + expires_in.saturating_sub(margin),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// Exchanges an API key for tokens at the IAM token endpoint.
pub struct IamTokenSource {
    client: reqwest::Client,
    token_url: String,
    api_key: String,
    margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl IamTokenSource {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| CatalogError::Auth("no API key configured".to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            token_url: format!("{}{}", config.iam_endpoint.trim_end_matches('/'), TOKEN_PATH),
            api_key,
            margin: Duration::from_secs(config.expiry_margin_secs),
            cached: Mutex::new(None),
        })
    }

    async fn exchange(&self) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", APIKEY_GRANT), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "IAM token exchange failed");
            return Err(CatalogError::Auth(format!("HTTP {status}: {body}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenSource for IamTokenSource {
    async fn refresh_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.token.clone());
        }

        let response = self.exchange().await?;
        let expires_in = Duration::from_secs(response.expires_in.unwrap_or_default());
        debug!(expires_in_secs = expires_in.as_secs(), "Obtained IAM refresh token");

        let token =
            CachedToken::new(response.refresh_token, expires_in, self.margin, Instant::now());
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}
