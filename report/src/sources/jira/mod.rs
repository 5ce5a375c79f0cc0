pub mod api;
pub mod config;
pub mod transformer;

use anyhow::{Context, Result};
use async_trait::async_trait;
use daylog::oauth::Provider;
use daylog::parallel::flat_map;
use daylog::AuthenticatedClient;
use futures::stream;
use std::sync::Arc;
use tracing::{debug, info};

use self::api::JiraClient;
use self::config::{JiraSettings, BASE_URL};
use self::transformer::issue_to_row;
use crate::row::{DayWindow, Row};
use crate::source::Source;

/// Issues the user worked on in open sprints.
pub struct JiraSource {
    settings: Arc<JiraSettings>,
    base_url: String,
}

impl JiraSource {
    pub fn new(settings: JiraSettings) -> Self {
        Self::with_base_url(settings, BASE_URL.to_string())
    }

    /// Create a source with a custom API gateway URL (for testing).
    pub fn with_base_url(settings: JiraSettings, base_url: String) -> Self {
        Self {
            settings: Arc::new(settings),
            base_url,
        }
    }
}

#[async_trait]
impl Source for JiraSource {
    fn name(&self) -> &str {
        "jira"
    }

    fn provider(&self) -> Provider {
        Provider::Atlassian
    }

    async fn rows(&self, client: AuthenticatedClient, window: &DayWindow) -> Result<Vec<Row>> {
        let jira = JiraClient::connect(client, &self.base_url)
            .await
            .context("Could not start Jira client")?;
        let me = jira.myself().await.context("Failed to fetch current Jira user")?;
        let issues = jira
            .search(&self.settings.jql_for(&me.account_id))
            .await
            .context("Issue search failed")?;
        info!(count = issues.len(), "Found candidate Jira issues");

        let account_id: Arc<str> = me.account_id.into();
        let settings = self.settings.clone();
        let window = window.clone();

        let mut rows = flat_map(stream::iter(issues), move |issue, _cancel| {
            let jira = jira.clone();
            let account_id = account_id.clone();
            let settings = settings.clone();
            let window = window.clone();
            async move {
                let changes = jira
                    .changelog(&issue.id)
                    .await
                    .with_context(|| format!("Failed to fetch changelog of {}", issue.key))?;
                let row = issue_to_row(&issue, &changes, &account_id, &settings, &window)?;
                if row.is_none() {
                    debug!(issue = %issue.key, "No reportable work on issue");
                }
                anyhow::Ok(stream::iter(row.into_iter().map(Ok)))
            }
        })
        .collect_all()
        .await?;

        rows.sort_by(|a, b| a.description.cmp(&b.description));
        Ok(rows)
    }
}
