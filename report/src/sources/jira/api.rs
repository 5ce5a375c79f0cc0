use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use daylog::AuthenticatedClient;
use serde::Deserialize;
use tracing::debug;

/// Jira timestamps look like `2024-03-21T10:15:30.123+0000`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

const SEARCH_PAGE_SIZE: &str = "100";
const SEARCH_FIELDS: &str = "summary,status,assignee,issuetype";

/// Atlassian cloud site the token grants access to.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessibleResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    pub account_id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub status: Named,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(rename = "issuetype", default)]
    pub issue_type: Named,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: String,
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    is_last: Option<bool>,
}

/// One field change inside a changelog entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    pub field: String,
    #[serde(default)]
    pub from_string: Option<String>,
    #[serde(default)]
    pub to_string: Option<String>,
}

/// A set of field changes made together by one author.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogHistory {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: Option<JiraUser>,
    pub created: String,
    #[serde(default)]
    pub items: Vec<ChangeItem>,
}

impl ChangelogHistory {
    pub fn created_at(&self) -> Result<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.created, TIMESTAMP_FORMAT)
            .with_context(|| format!("Invalid changelog timestamp {:?}", self.created))
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.account_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangelogPage {
    #[serde(default)]
    is_last: Option<bool>,
    #[serde(default)]
    next_page: Option<String>,
    #[serde(default)]
    values: Vec<ChangelogHistory>,
}

/// List the cloud sites the token can reach.
pub async fn accessible_resources(
    client: &AuthenticatedClient,
    base_url: &str,
) -> Result<Vec<AccessibleResource>> {
    client
        .get_json(&format!("{}/oauth/token/accessible-resources", base_url))
        .await
}

/// Client for one Jira Cloud site's REST API.
#[derive(Clone)]
pub struct JiraClient {
    client: AuthenticatedClient,
    site_url: String,
}

impl JiraClient {
    /// Resolve the token's single Jira site and bind to it.
    ///
    /// # Returns
    /// * `Ok(JiraClient)` - Client for `{base_url}/ex/jira/{cloud id}`
    /// * `Err` - The token reaches zero or several sites
    pub async fn connect(client: AuthenticatedClient, base_url: &str) -> Result<Self> {
        let resources = accessible_resources(&client, base_url).await?;
        let [resource] = resources.as_slice() else {
            return Err(anyhow!(
                "Expected exactly one accessible Jira site, found {}",
                resources.len()
            ));
        };
        debug!(site = %resource.name, url = %resource.url, "Using Jira site");
        let site_url = format!("{}/ex/jira/{}", base_url, urlencoding::encode(&resource.id));
        Ok(Self::with_site_url(client, site_url))
    }

    /// Bind directly to a site URL.
    pub fn with_site_url(client: AuthenticatedClient, site_url: String) -> Self {
        Self { client, site_url }
    }

    pub async fn myself(&self) -> Result<JiraUser> {
        self.client
            .get_json(&format!("{}/rest/api/3/myself", self.site_url))
            .await
    }

    /// Every issue matching `jql`.
    pub async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("jql", jql),
                ("fields", SEARCH_FIELDS),
                ("maxResults", SEARCH_PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("nextPageToken", token));
            }
            let query = serde_urlencoded::to_string(&query)
                .map_err(|e| anyhow!("Failed to encode search query: {}", e))?;
            let page: SearchResults = self
                .client
                .get_json(&format!("{}/rest/api/3/search/jql?{}", self.site_url, query))
                .await?;
            issues.extend(page.issues);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if page.is_last != Some(true) => page_token = Some(token),
                _ => break,
            }
        }
        Ok(issues)
    }

    /// Full change history of an issue, oldest first.
    pub async fn changelog(&self, issue_id: &str) -> Result<Vec<ChangelogHistory>> {
        let mut url = format!(
            "{}/rest/api/3/issue/{}/changelog",
            self.site_url,
            urlencoding::encode(issue_id)
        );
        let mut histories = Vec::new();
        loop {
            let page: ChangelogPage = self.client.get_json(&url).await?;
            histories.extend(page.values);
            match page.next_page.filter(|n| !n.is_empty()) {
                Some(next) if page.is_last != Some(true) => url = next,
                _ => break,
            }
        }
        Ok(histories)
    }
}
