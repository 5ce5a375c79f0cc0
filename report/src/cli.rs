use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};

pub const USAGE: &str = "\
Usage: daylog [--calendar] [--jira] [--bitbucket] [--date YYYY-MM-DD]

Prints the day's work activity as tab-separated rows.

Options:
  --calendar     include calendar meetings
  --jira         include Jira issue work
  --bitbucket    include Bitbucket code reviews
  --date DATE    day to report (default: today)
  -h, --help     show this help

With no source flag every source is included.
";

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub calendar: bool,
    pub jira: bool,
    pub bitbucket: bool,
    pub date: Option<NaiveDate>,
    pub help: bool,
}

impl Args {
    /// Parse arguments (without the program name). Flags may be written
    /// with one or two dashes, and `--date` takes `=VALUE` or a separate
    /// value.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let flag = arg
                .strip_prefix("--")
                .or_else(|| arg.strip_prefix('-'))
                .ok_or_else(|| anyhow!("Unexpected argument {:?}\n\n{}", arg, USAGE))?;
            let (name, inline) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (flag, None),
            };

            match name {
                "calendar" => parsed.calendar = true,
                "jira" => parsed.jira = true,
                "bitbucket" => parsed.bitbucket = true,
                "h" | "help" => parsed.help = true,
                "date" => {
                    let value = match inline {
                        Some(value) => value,
                        None => args
                            .next()
                            .ok_or_else(|| anyhow!("--date needs a value (YYYY-MM-DD)"))?,
                    };
                    let day = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .with_context(|| format!("Invalid --date {:?}, expected YYYY-MM-DD", value))?;
                    parsed.date = Some(day);
                }
                _ => return Err(anyhow!("Unknown flag {:?}\n\n{}", arg, USAGE)),
            }
        }
        Ok(parsed)
    }

    /// Names of the requested sources; empty means all.
    pub fn selected(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.calendar {
            names.push("calendar");
        }
        if self.jira {
            names.push("jira");
        }
        if self.bitbucket {
            names.push("bitbucket");
        }
        names
    }

    /// The report day, today when not given.
    pub fn day(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}
