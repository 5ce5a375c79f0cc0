//! Token endpoint calls: authorization code exchange and refresh.

use super::OAuthConfig;
use crate::credentials::Token;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Standard OAuth 2.0 token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(flatten)]
    extras: Map<String, Value>,
}

/// OAuth 2.0 error response (RFC 6749 section 5.2).
#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for a provider's token endpoint.
#[derive(Clone, Debug, Default)]
pub struct TokenEndpoint {
    http_client: reqwest::Client,
}

impl TokenEndpoint {
    /// Create an endpoint client sharing `http_client`'s connection pool and
    /// timeouts.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Exchange an authorization code for a token.
    ///
    /// # Arguments
    /// * `config` - Provider endpoints and client registration
    /// * `code` - Authorization code captured by the redirect listener
    ///
    /// # Returns
    /// * `Ok(Token)` - Newly issued token
    /// * `Err` - Transport failure or provider rejected the code
    pub async fn exchange_code(&self, config: &OAuthConfig, code: &str) -> Result<Token> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", config.redirect_url.as_str());
        form.insert("client_id", config.client_id.as_str());
        form.insert("client_secret", config.client_secret.as_str());

        debug!(token_url = %config.token_url, "Exchanging authorization code for token");
        let response = self.request_token(&config.token_url, &form).await?;
        Ok(response.into_token(None))
    }

    /// Renew `current` with its refresh value.
    ///
    /// A provider that does not rotate refresh values keeps the old one on
    /// the returned token.
    ///
    /// # Returns
    /// * `Ok(Token)` - Replacement token
    /// * `Err` - No refresh value, transport failure, or provider refused
    pub async fn refresh(&self, config: &OAuthConfig, current: &Token) -> Result<Token> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("Token has no refresh value"))?;

        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", config.client_id.as_str());
        form.insert("client_secret", config.client_secret.as_str());

        debug!(token_url = %config.token_url, "Refreshing token");
        let response = self.request_token(&config.token_url, &form).await?;
        Ok(response.into_token(current.refresh_token.clone()))
    }

    async fn request_token(
        &self,
        token_url: &str,
        form: &HashMap<&str, &str>,
    ) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(oauth_error) => anyhow!(
                    "Token endpoint returned {}: {}{}",
                    status,
                    oauth_error.error,
                    oauth_error
                        .error_description
                        .map(|d| format!(" ({})", d))
                        .unwrap_or_default()
                ),
                Err(_) => anyhow!("Token endpoint returned {}: {}", status, body),
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        if token_response.access_token.is_empty() {
            return Err(anyhow!("Token endpoint returned an empty access token"));
        }

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token issued"
        );
        Ok(token_response)
    }
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> Token {
        let expiry = self
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_default(),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            expiry,
            extras: self.extras,
        }
    }
}
