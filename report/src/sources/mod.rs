pub mod bitbucket;
pub mod calendar;
pub mod jira;

pub use bitbucket::BitbucketSource;
pub use calendar::CalendarSource;
pub use jira::JiraSource;
