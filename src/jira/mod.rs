//! Jira access: the raw REST boundary, its response types, and the client
//! the cache core talks to.

mod api;
mod api_types;
mod client;
#[cfg(test)]
pub(crate) mod fake;
mod payload;
mod rest;
mod types;

pub use client::JiraClient;
pub use types::{Issue, IssueTransition, NewIssue, Sprint, BACKLOG_ACRONYM};

#[cfg(test)]
pub(crate) use api_types::{api_issue, ApiSprint};
#[cfg(test)]
pub(crate) use types::{SprintState, Status, Transition, Workflow};
