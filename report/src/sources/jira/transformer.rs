use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::api::{ChangeItem, ChangelogHistory, Issue};
use super::config::{JiraSettings, PROJECT};
use crate::row::{DayWindow, Row};

const STATUS_FIELD: &str = "status";

pub const IMPLEMENTATION: &str = "Implementation";
pub const TESTING: &str = "Testing";

/// Statuses an issue held at any point during `[start, end)`.
///
/// Covers the status it entered before the window, every status touched by a
/// transition inside it, and the status it left after the window (or its
/// current status when nothing happened after).
pub fn states_between(
    issue: &Issue,
    changes: &[ChangelogHistory],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<BTreeSet<String>> {
    let mut dated = Vec::with_capacity(changes.len());
    for change in changes {
        dated.push((change.created_at()?.with_timezone(&Utc), change));
    }
    dated.sort_by_key(|(created, _)| *created);

    let mut states = BTreeSet::new();
    let mut last_before = None;
    let mut first_after = None;

    for (created, change) in dated {
        if created < start {
            last_before = Some(change);
            continue;
        }
        if created >= end {
            first_after = Some(change);
            break;
        }
        for item in status_items(change) {
            states.extend(item.from_string.clone());
            states.extend(item.to_string.clone());
        }
    }

    if let Some(change) = last_before {
        for item in status_items(change) {
            states.extend(item.to_string.clone());
        }
    }

    match first_after {
        Some(change) => {
            for item in status_items(change) {
                states.extend(item.from_string.clone());
            }
        }
        None => {
            states.insert(issue.fields.status.name.clone());
        }
    }

    Ok(states)
}

fn status_items(change: &ChangelogHistory) -> impl Iterator<Item = &ChangeItem> {
    change.items.iter().filter(|item| item.field == STATUS_FIELD)
}

/// Whether `account_id` ever changed `field` on the issue.
pub fn has_edited_field(changes: &[ChangelogHistory], account_id: &str, field: &str) -> bool {
    changes
        .iter()
        .filter(|change| change.author_id() == Some(account_id))
        .any(|change| change.items.iter().any(|item| item.field == field))
}

/// Classify the user's work on an issue.
///
/// # Returns
/// * `Some("Implementation")` - Assigned to the user and in progress (not a test execution)
/// * `Some("Testing")` - Assigned test execution in progress, or someone else's
///   issue in testing whose test cases the user edited
/// * `None` - No reportable work
pub fn sub_category(
    issue: &Issue,
    states: &BTreeSet<String>,
    changes: &[ChangelogHistory],
    account_id: &str,
    settings: &JiraSettings,
) -> Option<&'static str> {
    let assigned = issue
        .fields
        .assignee
        .as_ref()
        .is_some_and(|a| a.account_id == account_id);

    if assigned {
        if !states.contains(&settings.in_progress_status) {
            return None;
        }
        if issue.fields.issue_type.name == settings.test_execution_type {
            Some(TESTING)
        } else {
            Some(IMPLEMENTATION)
        }
    } else if states.contains(&settings.in_testing_status)
        && has_edited_field(changes, account_id, &settings.test_cases_field)
    {
        Some(TESTING)
    } else {
        None
    }
}

/// Build the report row for an issue, or `None` when the user did no
/// reportable work on it during the window.
pub fn issue_to_row(
    issue: &Issue,
    changes: &[ChangelogHistory],
    account_id: &str,
    settings: &JiraSettings,
    window: &DayWindow,
) -> Result<Option<Row>> {
    let states = states_between(issue, changes, window.start, window.end)?;
    let Some(sub_category) = sub_category(issue, &states, changes, account_id, settings) else {
        return Ok(None);
    };

    Ok(Some(Row {
        date: window.day,
        project: PROJECT.to_string(),
        sub_category: sub_category.to_string(),
        hours: None,
        description: format!("{}: {}", issue.key, issue.fields.summary),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::jira::api::{IssueFields, JiraUser, Named};
    use chrono::NaiveDate;

    const ME: &str = "me-123";

    fn window() -> DayWindow {
        DayWindow::utc(NaiveDate::from_ymd_opt(2024, 3, 21).unwrap())
    }

    fn issue(assignee: Option<&str>, issue_type: &str, status: &str) -> Issue {
        Issue {
            id: "10001".to_string(),
            key: "PD-7".to_string(),
            fields: IssueFields {
                summary: "Export report".to_string(),
                status: Named {
                    name: status.to_string(),
                },
                assignee: assignee.map(|id| JiraUser {
                    account_id: id.to_string(),
                    display_name: String::new(),
                }),
                issue_type: Named {
                    name: issue_type.to_string(),
                },
            },
        }
    }

    fn transition(created: &str, author: &str, from: &str, to: &str) -> ChangelogHistory {
        ChangelogHistory {
            id: created.to_string(),
            author: Some(JiraUser {
                account_id: author.to_string(),
                display_name: String::new(),
            }),
            created: created.to_string(),
            items: vec![ChangeItem {
                field: "status".to_string(),
                from_string: Some(from.to_string()),
                to_string: Some(to.to_string()),
            }],
        }
    }

    fn edit(created: &str, author: &str, field: &str) -> ChangelogHistory {
        ChangelogHistory {
            id: created.to_string(),
            author: Some(JiraUser {
                account_id: author.to_string(),
                display_name: String::new(),
            }),
            created: created.to_string(),
            items: vec![ChangeItem {
                field: field.to_string(),
                from_string: None,
                to_string: None,
            }],
        }
    }

    fn set(states: &[&str]) -> BTreeSet<String> {
        states.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_states_span_the_window() {
        let changes = vec![
            transition("2024-03-19T10:00:00.000+0000", ME, "To Do", "In Progress"),
            transition("2024-03-21T15:00:00.000+0000", ME, "In Progress", "In Review"),
            transition("2024-03-23T09:00:00.000+0000", ME, "In Review", "Done"),
        ];
        let w = window();
        let states = states_between(&issue(Some(ME), "Story", "Done"), &changes, w.start, w.end)
            .unwrap();

        assert_eq!(states, set(&["In Progress", "In Review"]));
    }

    #[test]
    fn test_current_status_used_when_nothing_after() {
        let changes = vec![transition(
            "2024-03-18T10:00:00.000+0000",
            ME,
            "To Do",
            "In Progress",
        )];
        let w = window();
        let states = states_between(
            &issue(Some(ME), "Story", "In Progress"),
            &changes,
            w.start,
            w.end,
        )
        .unwrap();

        assert_eq!(states, set(&["In Progress"]));
    }

    #[test]
    fn test_non_status_changes_ignored() {
        let changes = vec![edit("2024-03-21T11:00:00.000+0000", ME, "description")];
        let w = window();
        let states = states_between(&issue(Some(ME), "Story", "To Do"), &changes, w.start, w.end)
            .unwrap();
        assert_eq!(states, set(&["To Do"]));
    }

    #[test]
    fn test_assigned_in_progress_is_implementation() {
        let row = issue_to_row(
            &issue(Some(ME), "Story", "In Progress"),
            &[],
            ME,
            &JiraSettings::default(),
            &window(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(row.project, "Technical - ");
        assert_eq!(row.sub_category, "Implementation");
        assert_eq!(row.description, "PD-7: Export report");
        assert_eq!(row.date, window().day);
        assert!(row.hours.is_none());
    }

    #[test]
    fn test_assigned_test_execution_is_testing() {
        let states = set(&["In Progress"]);
        let category = sub_category(
            &issue(Some(ME), "Test Execution", "In Progress"),
            &states,
            &[],
            ME,
            &JiraSettings::default(),
        );
        assert_eq!(category, Some("Testing"));
    }

    #[test]
    fn test_assigned_but_idle_is_skipped() {
        let row = issue_to_row(
            &issue(Some(ME), "Story", "To Do"),
            &[],
            ME,
            &JiraSettings::default(),
            &window(),
        )
        .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_others_issue_in_testing_with_my_test_cases() {
        let changes = vec![edit("2024-03-21T11:00:00.000+0000", ME, "Test Cases")];
        let category = sub_category(
            &issue(Some("someone-else"), "Story", "In Testing"),
            &set(&["In Testing"]),
            &changes,
            ME,
            &JiraSettings::default(),
        );
        assert_eq!(category, Some("Testing"));
    }

    #[test]
    fn test_others_issue_without_my_edits_is_skipped() {
        let changes = vec![edit("2024-03-21T11:00:00.000+0000", "someone-else", "Test Cases")];
        let category = sub_category(
            &issue(None, "Story", "In Testing"),
            &set(&["In Testing"]),
            &changes,
            ME,
            &JiraSettings::default(),
        );
        assert_eq!(category, None);
    }

    #[test]
    fn test_has_edited_field() {
        let changes = vec![
            edit("2024-03-01T11:00:00.000+0000", "someone-else", "Test Cases"),
            edit("2024-03-02T11:00:00.000+0000", ME, "summary"),
        ];
        assert!(!has_edited_field(&changes, ME, "Test Cases"));
        assert!(has_edited_field(&changes, ME, "summary"));
    }
}
