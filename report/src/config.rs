//! Report settings: broker behaviour plus one section per source.
//!
//! ```toml
//! [broker]
//! persist_failure_fatal = true
//! callback_timeout_seconds = 300
//!
//! [bitbucket]
//! workspace = "acme"
//!
//! [jira]
//! jql = "project = OPS AND assignee = currentUser()"
//! ```

use anyhow::Result;
use daylog::config::{apply_env_overrides, load_config, BrokerConfig, SETTINGS_FILE};
use serde::Deserialize;
use std::path::Path;

use crate::sources::bitbucket::config::BitbucketSettings;
use crate::sources::calendar::config::CalendarSettings;
use crate::sources::jira::config::JiraSettings;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub calendar: CalendarSettings,
    #[serde(default)]
    pub jira: JiraSettings,
    #[serde(default)]
    pub bitbucket: BitbucketSettings,
}

impl ReportConfig {
    /// Read `settings.toml` from `config_dir` (defaults when absent), then
    /// apply environment overrides.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let mut config: ReportConfig = load_config(&config_dir.join(SETTINGS_FILE))?;
        apply_env_overrides(&mut config.broker);
        config.bitbucket.apply_env_overrides();
        Ok(config)
    }
}
