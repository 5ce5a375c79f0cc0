//! Interactive Authorization Code flow.

use super::callback::CallbackListener;
use super::exchange::TokenEndpoint;
use super::state::new_state;
use super::OAuthConfig;
use crate::credentials::Token;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default time the user has to complete the browser step.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Source of brand-new tokens when nothing cached can be used.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Obtain a fresh token for `config`.
    async fn acquire(&self, config: &OAuthConfig) -> Result<Token>;
}

/// Shows the authorize URL to the user.
pub type UrlPresenter = Arc<dyn Fn(&str) + Send + Sync>;

/// Browser-based grant: print the authorize URL, wait for the redirect,
/// exchange the code.
#[derive(Clone)]
pub struct AuthorizationFlow {
    endpoint: TokenEndpoint,
    callback_timeout: Duration,
    presenter: UrlPresenter,
}

impl AuthorizationFlow {
    /// Create a flow that prints the authorize URL to stderr.
    pub fn new(endpoint: TokenEndpoint) -> Self {
        Self {
            endpoint,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            presenter: Arc::new(print_to_terminal),
        }
    }

    /// Limit how long the redirect listener waits.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Replace how the authorize URL reaches the user.
    pub fn with_presenter(mut self, presenter: UrlPresenter) -> Self {
        self.presenter = presenter;
        self
    }
}

fn print_to_terminal(url: &str) {
    eprintln!("Go to the following link in your browser:\n\n{}\n", url);
}

#[async_trait]
impl Authorizer for AuthorizationFlow {
    async fn acquire(&self, config: &OAuthConfig) -> Result<Token> {
        let state = new_state();

        // Bind before showing the URL so a fast redirect cannot miss us
        let listener = CallbackListener::bind(&config.redirect_url)
            .await
            .context("Unable to start code retrieval listener")?;

        info!(redirect_url = %config.redirect_url, "Waiting for browser authorization");
        (self.presenter)(&config.authorize_url(&state));

        let code = listener
            .wait_for_code(&state, self.callback_timeout)
            .await
            .context("Code retrieval listener failed")?;

        self.endpoint
            .exchange_code(config, &code)
            .await
            .context("Unable to retrieve token from web")
    }
}
