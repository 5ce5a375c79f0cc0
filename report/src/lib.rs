//! Daily work activity report.
//!
//! Gathers what the user did on one day from several services and prints it
//! as tab-separated rows ready to paste into a timesheet:
//!
//! ```text
//!  CLI flags ──► registry ──► Source (calendar | jira | bitbucket)
//!                                 │
//!                     TokenBroker ┤ descriptor + token files in config dir
//!                                 ▼
//!                        AuthenticatedClient ──► provider API
//!                                 │
//!                                 ▼
//!                          Vec<Row> ──► ReportWriter ──► stdout
//! ```

pub mod cli;
pub mod config;
pub mod registry;
pub mod row;
pub mod runner;
pub mod source;
pub mod sources;
