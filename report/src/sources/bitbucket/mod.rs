pub mod api;
pub mod config;
pub mod transformer;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use daylog::oauth::Provider;
use daylog::parallel::flat_map;
use daylog::AuthenticatedClient;
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

use self::api::{BitbucketClient, ListActivity, ListRepositories, Repository};
use self::config::{BitbucketSettings, BASE_URL};
use self::transformer::{activity_query, activity_to_rows, repositories_query};
use crate::row::{DayWindow, Row};
use crate::source::Source;

const CONTRIBUTOR_ROLE: &str = "contributor";
const NEWEST_FIRST: &str = "-updated_on";
const ACTIVITY_FIELDS: &str = "+reviewers";

/// Pull requests the user followed, as code-review rows.
pub struct BitbucketSource {
    settings: Arc<BitbucketSettings>,
    base_url: String,
}

impl BitbucketSource {
    pub fn new(settings: BitbucketSettings) -> Self {
        Self::with_base_url(settings, BASE_URL.to_string())
    }

    /// Create a source with a custom API base URL (for testing).
    pub fn with_base_url(settings: BitbucketSettings, base_url: String) -> Self {
        Self {
            settings: Arc::new(settings),
            base_url,
        }
    }
}

#[async_trait]
impl Source for BitbucketSource {
    fn name(&self) -> &str {
        "bitbucket"
    }

    fn provider(&self) -> Provider {
        Provider::Bitbucket
    }

    async fn rows(&self, client: AuthenticatedClient, window: &DayWindow) -> Result<Vec<Row>> {
        if self.settings.workspace.is_empty() {
            return Err(anyhow!(
                "Bitbucket workspace is not configured (set [bitbucket] workspace in settings.toml \
                 or DAYLOG_BITBUCKET_WORKSPACE)"
            ));
        }

        let api = BitbucketClient::with_base_url(client, self.base_url.clone());
        let me = api
            .current_user()
            .await
            .context("Failed to fetch current Bitbucket user")?;

        let repos_query = repositories_query(window, self.settings.lookback_days);
        let mut repos = api
            .list_repositories(&ListRepositories {
                workspace: &self.settings.workspace,
                role: Some(CONTRIBUTOR_ROLE),
                query: Some(repos_query.as_str()),
                sort: Some(NEWEST_FIRST),
            })
            .await
            .context("Failed to list repositories")?;

        let query: Arc<str> = activity_query(window, &me.uuid).into();
        let settings = self.settings.clone();

        let activity = flat_map(repos.try_all(), move |repo: Result<Repository>, _cancel| {
            let api = api.clone();
            let query = query.clone();
            let settings = settings.clone();
            async move {
                let repo = repo.context("Failed to list repositories")?;
                let mut pages = api
                    .list_pull_request_activity(&ListActivity {
                        workspace: &settings.workspace,
                        slug: repo.slug(),
                        fields: Some(ACTIVITY_FIELDS),
                        states: &settings.states,
                        query: Some(&*query),
                    })
                    .await
                    .with_context(|| {
                        format!("Failed to list pull-request activity of {}", repo.full_name)
                    })?;
                let full_name = repo.full_name.clone();
                anyhow::Ok(
                    pages
                        .try_all()
                        .map(move |entry| entry.map(|a| (full_name.clone(), a))),
                )
            }
        })
        .collect_all()
        .await?;

        info!(entries = activity.len(), "Collected pull-request activity");
        Ok(activity_to_rows(&activity, window))
    }
}
