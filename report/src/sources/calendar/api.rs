use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use daylog::AuthenticatedClient;
use serde::Deserialize;
use tracing::debug;

use super::config::{CalendarSettings, BASE_URL};
use crate::row::DayWindow;

/// Start or end of a calendar event. Timed events carry `dateTime`,
/// all-day events carry `date`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub date: Option<String>,
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        self.date.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// Calendar event, reduced to what the report uses.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

/// Client for the Calendar v3 events API.
pub struct CalendarClient {
    client: AuthenticatedClient,
    base_url: String,
}

impl CalendarClient {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self::with_base_url(client, BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(client: AuthenticatedClient, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Single (expanded) non-deleted events overlapping `window`, ordered by
    /// start time.
    pub async fn list_events(
        &self,
        settings: &CalendarSettings,
        window: &DayWindow,
    ) -> Result<Vec<CalendarEvent>> {
        let time_min = window.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = window.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = settings.max_results.to_string();

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("showDeleted", "false"),
                ("singleEvents", "true"),
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("maxResults", max_results.as_str()),
                ("orderBy", "startTime"),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let query = serde_urlencoded::to_string(&query)
                .map_err(|e| anyhow!("Failed to encode events query: {}", e))?;
            let url = format!(
                "{}/calendars/{}/events?{}",
                self.base_url,
                urlencoding::encode(&settings.calendar_id),
                query
            );

            let page: EventList = self.client.get_json(&url).await?;
            debug!(count = page.items.len(), "Fetched calendar events");
            events.extend(page.items);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_decoding() {
        let event: CalendarEvent = serde_json::from_str(
            r#"{
                "id": "e1",
                "summary": "Design review",
                "start": {"dateTime": "2024-03-21T09:00:00-04:00"},
                "end": {"dateTime": "2024-03-21T10:30:00-04:00"}
            }"#,
        )
        .unwrap();

        let start = event.start.date_time.unwrap();
        assert_eq!(start.offset().local_minus_utc(), -4 * 3600);
        assert!(!event.start.is_all_day());
    }

    #[test]
    fn test_all_day_event() {
        let event: CalendarEvent = serde_json::from_str(
            r#"{"summary": "Vacation", "start": {"date": "2024-03-21"}, "end": {"date": "2024-03-22"}}"#,
        )
        .unwrap();
        assert!(event.start.is_all_day());
        assert!(event.start.date_time.is_none());
    }
}
