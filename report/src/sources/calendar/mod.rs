pub mod api;
pub mod config;
pub mod transformer;

use anyhow::{Context, Result};
use async_trait::async_trait;
use daylog::oauth::Provider;
use daylog::AuthenticatedClient;

use self::api::CalendarClient;
use self::config::{CalendarSettings, BASE_URL};
use self::transformer::event_to_row;
use crate::row::{DayWindow, Row};
use crate::source::Source;

/// Meetings from the user's calendar.
pub struct CalendarSource {
    settings: CalendarSettings,
    base_url: String,
}

impl CalendarSource {
    pub fn new(settings: CalendarSettings) -> Self {
        Self::with_base_url(settings, BASE_URL.to_string())
    }

    /// Create a source with a custom API base URL (for testing).
    pub fn with_base_url(settings: CalendarSettings, base_url: String) -> Self {
        Self { settings, base_url }
    }
}

#[async_trait]
impl Source for CalendarSource {
    fn name(&self) -> &str {
        "calendar"
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn rows(&self, client: AuthenticatedClient, window: &DayWindow) -> Result<Vec<Row>> {
        let api = CalendarClient::with_base_url(client, self.base_url.clone());
        let events = api
            .list_events(&self.settings, window)
            .await
            .context("Unable to retrieve calendar events")?;

        let mut rows = Vec::new();
        for event in &events {
            if let Some(row) = event_to_row(event, &self.settings)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
