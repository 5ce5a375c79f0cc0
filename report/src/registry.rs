use crate::config::ReportConfig;
use crate::source::Source;
use crate::sources::{BitbucketSource, CalendarSource, JiraSource};

/// Every source, in report order.
pub fn all_sources(config: &ReportConfig) -> Vec<Box<dyn Source>> {
    vec![
        Box::new(CalendarSource::new(config.calendar.clone())),
        Box::new(JiraSource::new(config.jira.clone())),
        Box::new(BitbucketSource::new(config.bitbucket.clone())),
    ]
}

/// Keep the sources named in `names`; an empty selection keeps them all.
pub fn select(sources: Vec<Box<dyn Source>>, names: &[&str]) -> Vec<Box<dyn Source>> {
    if names.is_empty() {
        return sources;
    }
    sources
        .into_iter()
        .filter(|s| names.contains(&s.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sources: &[Box<dyn Source>]) -> Vec<&str> {
        sources.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_all_sources_order() {
        let sources = all_sources(&ReportConfig::default());
        assert_eq!(names(&sources), vec!["calendar", "jira", "bitbucket"]);
    }

    #[test]
    fn test_select() {
        let config = ReportConfig::default();
        assert_eq!(names(&select(all_sources(&config), &[])).len(), 3);
        assert_eq!(
            names(&select(all_sources(&config), &["bitbucket", "calendar"])),
            vec!["calendar", "bitbucket"]
        );
    }
}
