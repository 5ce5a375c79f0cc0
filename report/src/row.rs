//! Report rows and their tab-separated rendering.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::io::Write;

/// Date column format ("March 21, 2024").
pub const DATE_FORMAT: &str = "%B %-d, %Y";

/// One line of the activity report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub date: NaiveDate,
    pub project: String,
    pub sub_category: String,
    pub hours: Option<Duration>,
    pub description: String,
}

impl Row {
    /// Columns in output order: date, project, sub-category, hours,
    /// description. Hours are decimal and blank when unknown.
    pub fn to_record(&self) -> [String; 5] {
        let hours = match self.hours {
            Some(d) if d != Duration::zero() => format!("{}", d.num_milliseconds() as f64 / 3_600_000.0),
            _ => String::new(),
        };
        [
            self.date.format(DATE_FORMAT).to_string(),
            self.project.clone(),
            self.sub_category.clone(),
            hours,
            self.description.clone(),
        ]
    }
}

/// The day a report covers, as an instant range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    /// First instant of the day
    pub start: DateTime<Utc>,
    /// First instant of the following day
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn new(day: NaiveDate, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { day, start, end }
    }

    /// The window of `day` in the local time zone.
    pub fn local(day: NaiveDate) -> Result<Self> {
        let start = local_midnight(day)?;
        let next = day
            .succ_opt()
            .ok_or_else(|| anyhow!("{} has no following day", day))?;
        let end = local_midnight(next)?;
        Ok(Self::new(day, start, end))
    }

    /// The window of `day` in UTC.
    pub fn utc(day: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN));
        Self::new(day, start, start + Duration::days(1))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

fn local_midnight(day: NaiveDate) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&day.and_time(chrono::NaiveTime::MIN))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Local midnight of {} does not exist", day))
}

/// Writes rows as tab-separated records.
///
/// Fields containing tabs, quotes, line breaks or leading whitespace are
/// quoted with doubled inner quotes.
pub struct ReportWriter<W: Write> {
    out: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.write_record(&row.to_record())
    }

    fn write_record(&mut self, fields: &[String]) -> Result<()> {
        let line = fields
            .iter()
            .map(|f| quote_field(f))
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(self.out, "{}", line).context("Failed to write report row")
    }

    /// Terminate the report with an empty record and flush.
    pub fn finish(mut self) -> Result<W> {
        self.write_record(&[])?;
        self.out.flush().context("Failed to flush report")?;
        Ok(self.out)
    }
}

fn quote_field(field: &str) -> String {
    let needs_quotes = field.contains(['\t', '"', '\r', '\n'])
        || field.starts_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
