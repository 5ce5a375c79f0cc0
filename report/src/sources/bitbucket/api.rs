use anyhow::{anyhow, Result};
use daylog::pagination::PaginatedResponse;
use daylog::AuthenticatedClient;
use serde::Deserialize;

use super::config::BASE_URL;

/// Bitbucket user or team.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub uuid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub uuid: String,
    pub full_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub updated_on: Option<String>,
}

impl Repository {
    /// URL slug: the part of `full_name` after the workspace.
    pub fn slug(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(_, slug)| slug)
            .unwrap_or(&self.full_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dated {
    pub date: String,
}

/// One entry of a repository's pull-request activity log.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestActivity {
    pub pull_request: PullRequest,
    #[serde(default)]
    pub approval: Option<Dated>,
    #[serde(default)]
    pub comment: Option<Dated>,
}

/// Repository listing filters.
#[derive(Debug, Default)]
pub struct ListRepositories<'a> {
    pub workspace: &'a str,
    pub role: Option<&'a str>,
    /// Bitbucket query language filter
    pub query: Option<&'a str>,
    pub sort: Option<&'a str>,
}

/// Pull-request activity filters.
#[derive(Debug, Default)]
pub struct ListActivity<'a> {
    pub workspace: &'a str,
    pub slug: &'a str,
    pub fields: Option<&'a str>,
    pub states: &'a [String],
    pub query: Option<&'a str>,
}

/// Client for the Bitbucket Cloud 2.0 API.
#[derive(Clone)]
pub struct BitbucketClient {
    client: AuthenticatedClient,
    base_url: String,
}

impl BitbucketClient {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self::with_base_url(client, BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(client: AuthenticatedClient, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn current_user(&self) -> Result<Account> {
        self.client
            .get_json(&format!("{}/2.0/user", self.base_url))
            .await
    }

    /// Repositories of a workspace, first page fetched.
    pub async fn list_repositories(
        &self,
        options: &ListRepositories<'_>,
    ) -> Result<PaginatedResponse<Repository>> {
        let mut query = Vec::new();
        query.extend(options.role.map(|v| ("role", v)));
        query.extend(options.query.map(|v| ("q", v)));
        query.extend(options.sort.map(|v| ("sort", v)));

        let url = format!(
            "{}/2.0/repositories/{}{}",
            self.base_url,
            urlencoding::encode(options.workspace),
            encode_query(&query)?
        );
        PaginatedResponse::fetch(self.client.clone(), &url).await
    }

    /// Pull-request activity of one repository, first page fetched.
    pub async fn list_pull_request_activity(
        &self,
        options: &ListActivity<'_>,
    ) -> Result<PaginatedResponse<PullRequestActivity>> {
        let mut query = Vec::new();
        query.extend(options.fields.map(|v| ("fields", v)));
        query.extend(options.states.iter().map(|s| ("state", s.as_str())));
        query.extend(options.query.map(|v| ("q", v)));

        let url = format!(
            "{}/2.0/repositories/{}/{}/pullrequests/activity{}",
            self.base_url,
            urlencoding::encode(options.workspace),
            urlencoding::encode(options.slug),
            encode_query(&query)?
        );
        PaginatedResponse::fetch(self.client.clone(), &url).await
    }
}

fn encode_query(pairs: &[(&str, &str)]) -> Result<String> {
    if pairs.is_empty() {
        return Ok(String::new());
    }
    let encoded = serde_urlencoded::to_string(pairs)
        .map_err(|e| anyhow!("Failed to encode query: {}", e))?;
    Ok(format!("?{}", encoded))
}
