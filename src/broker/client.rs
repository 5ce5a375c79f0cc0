//! HTTP client that attaches the current credential to every request.

use crate::credentials::Token;
use anyhow::{anyhow, Context, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Authenticated view of a shared `reqwest::Client` for one service.
///
/// Cheap to clone; clones share the connection pool and the token.
#[derive(Clone)]
pub struct AuthenticatedClient {
    http_client: reqwest::Client,
    service: Arc<str>,
    token: Arc<Token>,
}

impl AuthenticatedClient {
    pub fn new(http_client: reqwest::Client, service: &str, token: Token) -> Self {
        Self {
            http_client,
            service: Arc::from(service),
            token: Arc::new(token),
        }
    }

    /// Service this client talks to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Token presented on requests.
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Start a request carrying the `Authorization` header.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(service = %self.service, method = %method, url = %url, "Authenticated request");
        self.http_client
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                self.token.authorization_header(),
            )
            .header(reqwest::header::ACCEPT, "application/json")
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// GET `url` and decode the JSON body.
    ///
    /// # Returns
    /// * `Ok(T)` - Decoded body of a 2xx response
    /// * `Err` - Transport failure, non-2xx status, or undecodable body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", self.service, url))?;

        let response = check_response_status(&self.service, response).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response from {}", self.service, url))
    }
}

/// The provider rejected the presented token (HTTP 401).
///
/// Survives `anyhow` context wrapping; detect it with [`is_unauthorized`].
#[derive(Debug)]
pub struct Unauthorized {
    pub service: String,
    pub url: String,
}

impl std::fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} auth error: token expired or invalid ({})", self.service, self.url)
    }
}

impl std::error::Error for Unauthorized {}

/// Whether `err` or anything it wraps is an [`Unauthorized`] response.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Unauthorized>())
}

/// Map non-2xx responses to descriptive errors.
///
/// - 401 -> [`Unauthorized`]
/// - 403 -> missing permission or rate limit
/// - other non-2xx -> generic API error with body excerpt
pub async fn check_response_status(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();

    Err(match status {
        StatusCode::UNAUTHORIZED => Unauthorized {
            service: service.to_string(),
            url,
        }
        .into(),
        StatusCode::FORBIDDEN => anyhow!("{} denied access to {}: {}", service, url, excerpt),
        StatusCode::TOO_MANY_REQUESTS => anyhow!("{} rate limit exceeded ({})", service, url),
        _ => anyhow!("{} API error {} from {}: {}", service, status, url, excerpt),
    })
}
