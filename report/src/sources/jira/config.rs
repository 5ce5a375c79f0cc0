use serde::Deserialize;

/// Atlassian API gateway; Jira sites live under `/ex/jira/{cloud id}`.
pub const BASE_URL: &str = "https://api.atlassian.com";

pub const PROJECT: &str = "Technical - ";

/// Placeholder in the JQL template replaced by the current user's account id.
pub const ACCOUNT_ID_PLACEHOLDER: &str = "{account_id}";

/// `[jira]` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraSettings {
    /// Issue search; `{account_id}` is substituted before the query runs
    #[serde(default = "default_jql")]
    pub jql: String,
    /// Changelog field name that marks test-case work
    #[serde(default = "default_test_cases_field")]
    pub test_cases_field: String,
    /// Issue type whose implementation counts as testing
    #[serde(default = "default_test_execution_type")]
    pub test_execution_type: String,
    #[serde(default = "default_in_progress_status")]
    pub in_progress_status: String,
    #[serde(default = "default_in_testing_status")]
    pub in_testing_status: String,
}

fn default_jql() -> String {
    "project = PD AND (assignee = currentUser() OR issuekey in updatedBy(\"{account_id}\")) \
     AND sprint in openSprints() ORDER BY created DESC"
        .to_string()
}

fn default_test_cases_field() -> String {
    "Test Cases".to_string()
}

fn default_test_execution_type() -> String {
    "Test Execution".to_string()
}

fn default_in_progress_status() -> String {
    "In Progress".to_string()
}

fn default_in_testing_status() -> String {
    "In Testing".to_string()
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            jql: default_jql(),
            test_cases_field: default_test_cases_field(),
            test_execution_type: default_test_execution_type(),
            in_progress_status: default_in_progress_status(),
            in_testing_status: default_in_testing_status(),
        }
    }
}

impl JiraSettings {
    /// The search query for `account_id`.
    pub fn jql_for(&self, account_id: &str) -> String {
        self.jql.replace(ACCOUNT_ID_PLACEHOLDER, account_id)
    }
}
