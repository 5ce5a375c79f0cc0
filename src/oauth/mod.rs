//! OAuth 2.0 Authorization Code grant.
//!
//! # Flow
//!
//! ```text
//! AuthorizationFlow::acquire
//!   1. new_state()                  32 random bytes, URL-safe base64
//!   2. CallbackListener::bind       host:port of the redirect URI
//!   3. present authorize URL        user opens it in a browser
//!   4. provider redirects           GET /?code=...&state=...
//!   5. listener validates state     mismatch -> 401, keep listening
//!   6. TokenEndpoint::exchange_code form POST to the token URL
//! ```

pub mod callback;
pub mod exchange;
pub mod flow;
pub mod provider;
pub mod state;

pub use callback::CallbackListener;
pub use exchange::TokenEndpoint;
pub use flow::{AuthorizationFlow, Authorizer};
pub use provider::{ClientDescriptor, Provider};
pub use state::new_state;

use serde::{Deserialize, Serialize};

/// Everything needed to run the grant against one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Registered client ID
    pub client_id: String,

    /// Registered client secret
    pub client_secret: String,

    /// Authorization endpoint the user is sent to
    pub auth_url: String,

    /// Token endpoint for code exchange and refresh
    pub token_url: String,

    /// Redirect URI registered with the provider; the local listener binds
    /// its host and port
    pub redirect_url: String,

    /// Requested scopes (sent space-joined)
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Provider-specific authorize parameters (`audience`, `prompt`, ...)
    #[serde(default)]
    pub auth_params: Vec<(String, String)>,
}

impl OAuthConfig {
    /// Build the authorize URL for one flow instance.
    pub fn authorize_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.auth_url,
            separator,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        );
        for (key, value) in &self.auth_params {
            url.push('&');
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}
