use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::BTreeMap;

use super::api::PullRequestActivity;
use super::config::{PROJECT, SUB_CATEGORY};
use crate::row::{DayWindow, Row};

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Repository filter: touched within `lookback_days` before the window.
pub fn repositories_query(window: &DayWindow, lookback_days: i64) -> String {
    format!(
        "updated_on > {}",
        timestamp(window.start - Duration::days(lookback_days))
    )
}

/// Activity filter: pull requests `user_uuid` follows, updated inside the
/// window.
pub fn activity_query(window: &DayWindow, user_uuid: &str) -> String {
    format!(
        "followers.uuid=\"{}\" AND updated_on > {} AND updated_on < {}",
        user_uuid,
        timestamp(window.start),
        timestamp(window.end)
    )
}

/// One code-review row per distinct pull request, ordered by title.
///
/// `activity` pairs each entry with the repository it came from, since
/// pull-request ids are only unique per repository.
pub fn activity_to_rows(activity: &[(String, PullRequestActivity)], window: &DayWindow) -> Vec<Row> {
    let mut reviewed = BTreeMap::new();
    for (repo, entry) in activity {
        reviewed
            .entry((repo.as_str(), entry.pull_request.id))
            .or_insert_with(|| entry.pull_request.title.clone());
    }

    let mut rows: Vec<Row> = reviewed
        .into_values()
        .map(|title| Row {
            date: window.day,
            project: PROJECT.to_string(),
            sub_category: SUB_CATEGORY.to_string(),
            hours: None,
            description: title,
        })
        .collect();
    rows.sort_by(|a, b| a.description.cmp(&b.description));
    rows
}
