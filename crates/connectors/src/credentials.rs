//! Credential acquisition for warehouse sessions.
//!
//! Supports a pre-issued static token and the OAuth 2.0 Client Credentials
//! flow with token caching. Providers never embed secret material in the
//! errors they return.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use quarry_common::config::CredentialsSettings;
use quarry_error::{ErrorCode, ErrorContext, QuarryError, Result};

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Returns a warehouse session token, fetching or refreshing as needed.
    async fn access_token(&self) -> Result<SecretString>;
}

/// Builds the provider matching the configured credential flow.
pub fn provider_from_settings(settings: &CredentialsSettings) -> Box<dyn CredentialsProvider> {
    match settings {
        CredentialsSettings::Static { token } => {
            Box::new(StaticTokenProvider::from_secret(token.clone()))
        }
        CredentialsSettings::OauthClientCredentials {
            client_id,
            client_secret,
            token_url,
            scopes,
        } => Box::new(OAuthCredentialsProvider::new(
            client_id.clone(),
            client_secret.clone(),
            token_url.clone(),
            scopes.clone(),
        )),
    }
}

/// A pre-issued token, typically injected via environment.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    pub fn from_secret(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialsProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString> {
        if self.token.expose_secret().is_empty() {
            return Err(QuarryError::new(
                ErrorCode::AuthenticationFailed,
                "No warehouse token configured",
            )
            .with_context(ErrorContext::Auth {
                provider: "static".to_string(),
            })
            .with_hint("Set QUARRY_WAREHOUSE__TOKEN or configure warehouse.credentials"));
        }
        Ok(self.token.clone())
    }
}

/// OAuth 2.0 token response from the authorization server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Cached token with expiry tracking.
#[derive(Clone)]
struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    /// Expired when within the 60s refresh buffer.
    fn is_expired(&self) -> bool {
        Instant::now() + Duration::from_secs(60) >= self.expires_at
    }
}

/// OAuth 2.0 Client Credentials provider with a cached token.
pub struct OAuthCredentialsProvider {
    client_id: String,
    client_secret: SecretString,
    token_url: String,
    scopes: Vec<String>,
    client: reqwest::Client,
    cache: Cache<String, CachedToken>,
}

impl OAuthCredentialsProvider {
    pub fn new(
        client_id: String,
        client_secret: SecretString,
        token_url: String,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            scopes,
            client: reqwest::Client::new(),
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(8)
                .build(),
        }
    }

    fn cache_key(&self) -> String {
        format!("{}:{}", self.token_url, self.client_id)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        tracing::info!(token_url = %self.token_url, "Fetching new OAuth token");

        let scope = self.scopes.join(" ");
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        if !scope.is_empty() {
            form.push(("scope", &scope));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| auth_error(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(auth_error(format!(
                "Token endpoint returned status {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| auth_error(format!("Failed to parse token response: {}", e)))?;

        let expires_in = token.expires_in.unwrap_or(3600);
        Ok(CachedToken {
            access_token: SecretString::from(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }
}

fn auth_error(message: String) -> QuarryError {
    QuarryError::new(ErrorCode::AuthenticationFailed, message).with_context(ErrorContext::Auth {
        provider: "oauth_client_credentials".to_string(),
    })
}

#[async_trait]
impl CredentialsProvider for OAuthCredentialsProvider {
    async fn access_token(&self) -> Result<SecretString> {
        let key = self.cache_key();

        // try_get_with is atomic, so concurrent callers share one fetch
        let mut cached = self
            .cache
            .try_get_with(key.clone(), self.fetch_token())
            .await
            .map_err(|e: std::sync::Arc<QuarryError>| (*e).clone())?;

        if cached.is_expired() {
            self.cache.invalidate(&key).await;
            cached = self
                .cache
                .try_get_with(key, self.fetch_token())
                .await
                .map_err(|e: std::sync::Arc<QuarryError>| (*e).clone())?;
        }

        Ok(cached.access_token)
    }
}
