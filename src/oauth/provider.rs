//! OAuth provider endpoints and client registration descriptors.

use super::OAuthConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identity providers the report talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    /// Atlassian Cloud (Jira)
    Atlassian,
    /// Bitbucket Cloud
    Bitbucket,
    /// Google (Calendar)
    Google,
}

impl Provider {
    /// Authorization endpoint.
    pub fn auth_url(&self) -> &'static str {
        match self {
            Self::Atlassian => "https://auth.atlassian.com/authorize",
            Self::Bitbucket => "https://bitbucket.org/site/oauth2/authorize",
            Self::Google => "https://accounts.google.com/o/oauth2/auth",
        }
    }

    /// Token endpoint.
    pub fn token_url(&self) -> &'static str {
        match self {
            Self::Atlassian => "https://auth.atlassian.com/oauth/token",
            Self::Bitbucket => "https://bitbucket.org/site/oauth2/access_token",
            Self::Google => "https://oauth2.googleapis.com/token",
        }
    }

    /// Extra authorize parameters the provider needs to issue a refreshable
    /// token for the right API.
    pub fn auth_params(&self) -> Vec<(String, String)> {
        let params: &[(&str, &str)] = match self {
            Self::Atlassian => &[("audience", "api.atlassian.com"), ("prompt", "consent")],
            Self::Bitbucket => &[],
            Self::Google => &[("access_type", "offline")],
        };
        params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Client registration as stored in `<service>_creds.json`.
#[derive(Clone, Deserialize, Serialize)]
pub struct ClientDescriptor {
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl ClientDescriptor {
    /// Read a descriptor file.
    ///
    /// # Returns
    /// * `Ok(ClientDescriptor)` - Parsed registration
    /// * `Err` - File missing, unreadable, or missing required fields
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read client secret file {}", path.display()))?;
        let descriptor: ClientDescriptor = serde_json::from_str(&contents)
            .with_context(|| format!("Unable to parse client secret file {}", path.display()))?;

        if descriptor.client_id.is_empty() {
            return Err(anyhow!("{}: client_id is empty", path.display()));
        }
        if descriptor.redirect_uri.is_empty() {
            return Err(anyhow!("{}: redirect_uri is empty", path.display()));
        }
        Ok(descriptor)
    }

    /// Combine the registration with a provider's endpoints.
    pub fn into_oauth_config(self, provider: Provider) -> OAuthConfig {
        OAuthConfig {
            client_id: self.client_id,
            client_secret: self.client_secret,
            auth_url: provider.auth_url().to_string(),
            token_url: provider.token_url().to_string(),
            redirect_url: self.redirect_uri,
            scopes: self.scopes,
            auth_params: provider.auth_params(),
        }
    }
}
