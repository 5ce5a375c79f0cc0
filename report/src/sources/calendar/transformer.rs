use anyhow::{anyhow, Result};

use super::api::CalendarEvent;
use super::config::{CalendarSettings, MEETINGS_PROJECT, STANDUP_PROJECT};
use crate::row::Row;

/// Transform a calendar event into a meeting row.
///
/// All-day events yield `None`. The row is dated by the event's start in its
/// own offset and its hours are the event's length.
pub fn event_to_row(event: &CalendarEvent, settings: &CalendarSettings) -> Result<Option<Row>> {
    if event.start.is_all_day() || event.end.is_all_day() {
        return Ok(None);
    }
    let start = event
        .start
        .date_time
        .ok_or_else(|| anyhow!("Event {} has no start time", event.id))?;
    let end = event
        .end
        .date_time
        .ok_or_else(|| anyhow!("Event {} has no end time", event.id))?;

    let standup =
        !settings.standup_keyword.is_empty() && event.summary.contains(&settings.standup_keyword);
    let (project, description) = if standup {
        (STANDUP_PROJECT, String::new())
    } else {
        (MEETINGS_PROJECT, event.summary.clone())
    };

    Ok(Some(Row {
        date: start.date_naive(),
        project: project.to_string(),
        sub_category: String::new(),
        hours: Some(end.signed_duration_since(start)),
        description,
    }))
}
