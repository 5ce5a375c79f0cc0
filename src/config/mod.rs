pub mod runtime;
pub use runtime::{apply_env_overrides, config_dir};

use crate::broker::PersistFailure;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// Name of the optional settings file inside the config directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Token broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Fail when a freshly obtained token cannot be saved
    #[serde(default = "default_persist_failure_fatal")]
    pub persist_failure_fatal: bool,
    /// How long the redirect listener waits for the browser (seconds)
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,
    /// Per-request timeout for provider and API calls (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_persist_failure_fatal() -> bool {
    true
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            persist_failure_fatal: default_persist_failure_fatal(),
            callback_timeout_seconds: default_callback_timeout(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl BrokerConfig {
    pub fn persist_failure(&self) -> PersistFailure {
        if self.persist_failure_fatal {
            PersistFailure::Fatal
        } else {
            PersistFailure::Continue
        }
    }
}

/// Load a TOML settings file, falling back to defaults when it does not
/// exist.
pub fn load_config<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read settings {}", path.display()))
        }
    };
    toml::from_str(&contents).with_context(|| format!("Failed to parse settings {}", path.display()))
}
