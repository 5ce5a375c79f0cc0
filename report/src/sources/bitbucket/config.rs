use serde::Deserialize;

pub const BASE_URL: &str = "https://api.bitbucket.org";

pub const PROJECT: &str = "Technical - ";
pub const SUB_CATEGORY: &str = "Code Review";

/// `[bitbucket]` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketSettings {
    /// Workspace slug; required when the Bitbucket source runs
    #[serde(default)]
    pub workspace: String,
    /// Repositories untouched for longer than this are skipped
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Pull-request states to report
    #[serde(default = "default_states")]
    pub states: Vec<String>,
}

fn default_lookback_days() -> i64 {
    30
}

fn default_states() -> Vec<String> {
    vec!["OPEN".to_string(), "MERGED".to_string()]
}

impl Default for BitbucketSettings {
    fn default() -> Self {
        Self {
            workspace: String::new(),
            lookback_days: default_lookback_days(),
            states: default_states(),
        }
    }
}

impl BitbucketSettings {
    /// Override the workspace from `DAYLOG_BITBUCKET_WORKSPACE`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DAYLOG_BITBUCKET_WORKSPACE") {
            if !v.is_empty() {
                self.workspace = v;
            }
        }
    }
}
