use serde::Deserialize;

pub const BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Project column for meetings.
pub const MEETINGS_PROJECT: &str = "Meetings - ";
/// Project column for the daily standup.
pub const STANDUP_PROJECT: &str = "Meetings - Daily Standup";

/// `[calendar]` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarSettings {
    /// Calendar to read
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Events whose title contains this are reported as the standup
    #[serde(default = "default_standup_keyword")]
    pub standup_keyword: String,
    /// Upper bound on events fetched for one day
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_standup_keyword() -> String {
    "Standup".to_string()
}

fn default_max_results() -> u32 {
    100
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            standup_keyword: default_standup_keyword(),
            max_results: default_max_results(),
        }
    }
}
