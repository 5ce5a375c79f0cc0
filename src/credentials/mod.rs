//! OAuth token records and their on-disk storage.
//!
//! A [`Token`] is an immutable snapshot of what the provider issued. Refreshing
//! produces a new `Token` that replaces the old one on disk and in memory; the
//! old value is never edited in place.
//!
//! # Usage
//!
//! ```no_run
//! use daylog::credentials::{FileTokenStore, Token, TokenStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = FileTokenStore::new("/home/me/.config/daylog");
//!
//! match store.load("jira") {
//!     Some(token) if token.is_valid() => println!("cached token still usable"),
//!     Some(_) => println!("cached token needs a refresh"),
//!     None => println!("no token yet, interactive authorization required"),
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

mod storage;

pub use storage::{FileTokenStore, TokenStore};

/// Tokens that expire within this window are already treated as expired, so a
/// request never leaves with a credential that dies in flight.
pub const EXPIRY_SKEW_SECONDS: i64 = 10;

/// Credential issued by an OAuth provider.
///
/// Field names match the JSON token files written by earlier versions of the
/// tool, so existing `<service>_token.json` files keep loading.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Access value presented on every request
    pub access_token: String,

    /// Scheme tag reported by the provider ("Bearer" when empty)
    #[serde(default)]
    pub token_type: String,

    /// Refresh value; absent when the provider did not issue one
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub refresh_token: Option<String>,

    /// When the access value stops working; `None` means it never expires
    #[serde(default, deserialize_with = "zero_time_as_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Extra fields returned by the token endpoint (`scope`, `id_token`, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl Token {
    /// Build a bearer token with the given lifetime.
    pub fn bearer(access_token: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: expires_in.map(|d| Utc::now() + d),
            extras: Map::new(),
        }
    }

    /// Whether the token can be presented right now.
    ///
    /// A token without an expiry is always valid as long as it carries an
    /// access value.
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) > Utc::now(),
            None => true,
        }
    }

    /// Whether the token can be renewed without user interaction.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Authorization scheme to present, normalized the way providers expect.
    pub fn authorization_scheme(&self) -> &str {
        let kind = self.token_type.as_str();
        if kind.is_empty() || kind.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else if kind.eq_ignore_ascii_case("mac") {
            "MAC"
        } else if kind.eq_ignore_ascii_case("basic") {
            "Basic"
        } else {
            kind
        }
    }

    /// Full `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.authorization_scheme(), self.access_token)
    }

    /// Whether `other` carries a different grant than `self`.
    ///
    /// Only the access value, refresh value, type and expiry count; issuance
    /// extras do not, so a refresh that returns an identical grant with
    /// different metadata does not rewrite the token file.
    pub fn differs_from(&self, other: &Token) -> bool {
        self.access_token != other.access_token
            || self.refresh_token != other.refresh_token
            || self.token_type != other.token_type
            || self.expiry != other.expiry
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("extras", &self.extras.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// Older token files write the zero time ("0001-01-01T00:00:00Z") for tokens
// that never expire.
fn zero_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|t| t.year() > 1))
}
