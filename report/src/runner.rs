use anyhow::{Context, Result};
use daylog::config::BrokerConfig;
use daylog::oauth::ClientDescriptor;
use daylog::broker::is_unauthorized;
use daylog::TokenBroker;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::row::{DayWindow, Row};
use crate::source::Source;

/// Client descriptor file of a service: `<dir>/<service>_creds.json`.
pub fn descriptor_path(config_dir: &Path, service: &str) -> PathBuf {
    config_dir.join(format!("{}_creds.json", service))
}

/// Collect one source's rows using credentials from `broker`.
///
/// A token the provider rejects is renewed and the source retried once.
pub async fn collect(source: &dyn Source, broker: &TokenBroker, window: &DayWindow) -> Result<Vec<Row>> {
    match collect_once(source, broker, window).await {
        Err(err) if is_unauthorized(&err) => {
            warn!(service = %source.name(), error = %err, "Token rejected by provider, renewing");
            broker.invalidate().await;
            collect_once(source, broker, window).await
        }
        collected => collected,
    }
}

async fn collect_once(source: &dyn Source, broker: &TokenBroker, window: &DayWindow) -> Result<Vec<Row>> {
    let service = source.name();
    let client = broker
        .client()
        .await
        .with_context(|| format!("Could not start {} client", service))?;
    let rows = source
        .rows(client, window)
        .await
        .with_context(|| format!("Failed to collect {} activity", service))?;
    info!(service = %service, rows = rows.len(), "Source finished");
    Ok(rows)
}

/// Runs sources with interactive brokers rooted in the config directory.
pub struct SourceRunner {
    config_dir: PathBuf,
    broker: BrokerConfig,
}

impl SourceRunner {
    pub fn new(config_dir: PathBuf, broker: BrokerConfig) -> Self {
        Self { config_dir, broker }
    }

    /// Build the broker for `source` from its descriptor file and collect
    /// its rows.
    pub async fn run(&self, source: &dyn Source, window: &DayWindow) -> Result<Vec<Row>> {
        let service = source.name();
        let descriptor = ClientDescriptor::load(&descriptor_path(&self.config_dir, service))?;
        let oauth = descriptor.into_oauth_config(source.provider());
        let broker = TokenBroker::interactive(service, oauth, &self.config_dir, &self.broker)?;
        collect(source, &broker, window).await
    }
}
