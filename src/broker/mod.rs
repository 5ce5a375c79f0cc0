//! Token broker: hands out authenticated clients for one service.
//!
//! # Resolution order
//!
//! ```text
//! in-memory token valid?            -> use it
//! store.load(service)
//!   None                            -> authorizer.acquire, save
//!   Some(valid)                     -> use it
//!   Some(expired)                   -> refresh
//!     ok                            -> save if the grant changed
//!     failed / no refresh value     -> warn, authorizer.acquire, save
//! ```
//!
//! Persistence failures are fatal unless the broker was built with
//! [`PersistFailure::Continue`]. Either way the freshly obtained token is not
//! lost: the error carries it.

mod client;

pub use client::{check_response_status, is_unauthorized, AuthenticatedClient, Unauthorized};

use crate::config::BrokerConfig;
use crate::credentials::{FileTokenStore, Token, TokenStore};
use crate::oauth::{AuthorizationFlow, Authorizer, OAuthConfig, TokenEndpoint};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What to do when a token cannot be written to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistFailure {
    /// Return [`BrokerError::Persistence`]
    #[default]
    Fatal,
    /// Log and keep using the in-memory token
    Continue,
}

/// Broker behavior knobs.
#[derive(Clone, Debug, Default)]
pub struct BrokerOptions {
    pub persist_failure: PersistFailure,
}

/// Failures surfaced by [`TokenBroker::client`].
#[derive(Debug)]
pub enum BrokerError {
    /// Interactive authorization failed; the user must retry and open the
    /// printed URL
    Authorization {
        service: String,
        source: anyhow::Error,
    },
    /// A valid token was obtained but could not be saved
    Persistence {
        service: String,
        token: Box<Token>,
        source: anyhow::Error,
    },
}

impl BrokerError {
    /// The valid-but-unsaved token carried by a persistence failure.
    pub fn unsaved_token(&self) -> Option<&Token> {
        match self {
            BrokerError::Persistence { token, .. } => Some(token),
            BrokerError::Authorization { .. } => None,
        }
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Authorization { service, source } => write!(
                f,
                "Authorization for {} failed: {:#}. Run again and open the printed link to grant access",
                service, source
            ),
            BrokerError::Persistence { service, source, .. } => {
                write!(f, "Unable to save {} token: {:#}", service, source)
            }
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Authorization { source, .. } | BrokerError::Persistence { source, .. } => {
                Some(source.as_ref())
            }
        }
    }
}

#[derive(Default)]
struct Cached {
    token: Option<Token>,
    invalidated: bool,
}

/// Supplies valid credentials for one service.
///
/// Calls are serialized internally, so concurrent callers never race on the
/// token file or start two interactive flows.
pub struct TokenBroker {
    service: String,
    oauth: OAuthConfig,
    store: Arc<dyn TokenStore>,
    authorizer: Arc<dyn Authorizer>,
    endpoint: TokenEndpoint,
    http_client: reqwest::Client,
    options: BrokerOptions,
    cached: Mutex<Cached>,
}

impl TokenBroker {
    /// Create a broker from explicit parts.
    ///
    /// # Arguments
    /// * `service` - Storage key, also used in logs ("jira", "bitbucket", ...)
    /// * `oauth` - Provider endpoints and client registration
    /// * `store` - Where tokens are persisted
    /// * `authorizer` - Source of new tokens when nothing cached works
    pub fn new(
        service: impl Into<String>,
        oauth: OAuthConfig,
        store: Arc<dyn TokenStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let http_client = reqwest::Client::new();
        Self {
            service: service.into(),
            oauth,
            store,
            authorizer,
            endpoint: TokenEndpoint::new(http_client.clone()),
            http_client,
            options: BrokerOptions::default(),
            cached: Mutex::new(Cached::default()),
        }
    }

    /// Broker backed by token files in `token_dir` and the browser flow.
    pub fn interactive(
        service: impl Into<String>,
        oauth: OAuthConfig,
        token_dir: &Path,
        config: &BrokerConfig,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("daylog/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        let endpoint = TokenEndpoint::new(http_client.clone());
        let flow = AuthorizationFlow::new(endpoint)
            .with_callback_timeout(Duration::from_secs(config.callback_timeout_seconds));

        Ok(Self::new(
            service,
            oauth,
            Arc::new(FileTokenStore::new(token_dir)),
            Arc::new(flow),
        )
        .with_http_client(http_client)
        .with_options(BrokerOptions {
            persist_failure: config.persist_failure(),
        }))
    }

    /// Use `http_client` for refresh calls and authenticated requests.
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.endpoint = TokenEndpoint::new(http_client.clone());
        self.http_client = http_client;
        self
    }

    pub fn with_options(mut self, options: BrokerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Client that presents a currently valid token.
    pub async fn client(&self) -> Result<AuthenticatedClient, BrokerError> {
        let token = self.token().await?;
        Ok(AuthenticatedClient::new(
            self.http_client.clone(),
            &self.service,
            token,
        ))
    }

    /// Mark the current token as rejected by the provider; the next call
    /// refreshes it even if its expiry has not passed.
    pub async fn invalidate(&self) {
        self.cached.lock().await.invalidated = true;
    }

    /// A currently valid token, refreshing or re-authorizing as needed.
    pub async fn token(&self) -> Result<Token, BrokerError> {
        let mut cached = self.cached.lock().await;
        let invalidated = std::mem::take(&mut cached.invalidated);

        let candidate = match cached.token.take() {
            Some(token) => Some(token),
            None => self.store.load(&self.service),
        };

        let resolved = match candidate {
            None => {
                info!(service = %self.service, "No stored token, starting browser authorization");
                self.authorize_and_save().await
            }
            Some(token) if token.is_valid() && !invalidated => {
                debug!(service = %self.service, "Using cached token");
                Ok(token)
            }
            Some(stale) => self.renew(stale).await,
        };

        // Keep whatever valid token we ended up with, even if saving failed
        match &resolved {
            Ok(token) => cached.token = Some(token.clone()),
            Err(err) => cached.token = err.unsaved_token().cloned(),
        }
        resolved
    }

    async fn renew(&self, stale: Token) -> Result<Token, BrokerError> {
        info!(service = %self.service, "Refreshing OAuth token");
        match self.endpoint.refresh(&self.oauth, &stale).await {
            Ok(refreshed) => {
                if refreshed.differs_from(&stale) {
                    self.persist(refreshed)
                } else {
                    Ok(refreshed)
                }
            }
            Err(e) => {
                warn!(service = %self.service, error = %e, "Failed to refresh access token");
                self.authorize_and_save().await
            }
        }
    }

    async fn authorize_and_save(&self) -> Result<Token, BrokerError> {
        let token = self
            .authorizer
            .acquire(&self.oauth)
            .await
            .map_err(|source| BrokerError::Authorization {
                service: self.service.clone(),
                source,
            })?;
        info!(service = %self.service, "Authorization complete");
        self.persist(token)
    }

    fn persist(&self, token: Token) -> Result<Token, BrokerError> {
        match self.store.save(&self.service, &token) {
            Ok(()) => Ok(token),
            Err(source) => match self.options.persist_failure {
                PersistFailure::Fatal => Err(BrokerError::Persistence {
                    service: self.service.clone(),
                    token: Box::new(token),
                    source,
                }),
                PersistFailure::Continue => {
                    warn!(service = %self.service, error = %source, "Unable to save token, continuing with in-memory token");
                    Ok(token)
                }
            },
        }
    }
}
