use super::BrokerConfig;
use std::path::PathBuf;

/// Directory name under the platform config directory.
pub const APP_DIR: &str = "daylog";

/// Directory holding settings, client descriptors and token files.
///
/// `DAYLOG_CONFIG_DIR` wins; otherwise `<platform config dir>/daylog`
/// (`~/.config/daylog` on Linux), or `/daylog` when no home is known.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DAYLOG_CONFIG_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(APP_DIR)
}

/// Apply env vars on top of file settings.
pub fn apply_env_overrides(cfg: &mut BrokerConfig) {
    if let Ok(v) = std::env::var("DAYLOG_PERSIST_FAILURE_FATAL") {
        if let Ok(b) = v.parse::<bool>() {
            cfg.persist_failure_fatal = b;
        }
    }
    if let Ok(v) = std::env::var("DAYLOG_CALLBACK_TIMEOUT_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            cfg.callback_timeout_seconds = n;
        }
    }
    if let Ok(v) = std::env::var("DAYLOG_HTTP_TIMEOUT_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            cfg.http_timeout_seconds = n;
        }
    }
}
