//! The narrow boundary between the cache core and the Jira REST API.

use async_trait::async_trait;

use crate::error::Result;

use super::api_types::{ApiIssue, ApiSprint};
use super::payload::{IssuePayload, SprintPayload};
use super::types::{SprintState, User};

/// One page of a JQL search
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
  pub issues: Vec<ApiIssue>,
  /// Total number of matches across all pages
  pub total: u64,
}

/// Raw Jira operations the client builds on.
///
/// Implementations perform exactly one remote call per method and never
/// retry; non-success responses become [`crate::error::Error::Remote`].
#[async_trait]
pub trait JiraApi: Send + Sync {
  /// Run a JQL query and return the page starting at `start_at`.
  async fn search(&self, jql: &str, start_at: u64, max_results: u32) -> Result<SearchPage>;

  /// Create an issue and return its key.
  async fn create_issue(&self, payload: &IssuePayload) -> Result<String>;

  async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()>;

  /// Ids of the boards associated with a project, in Jira's order.
  async fn boards_for_project(&self, project: &str) -> Result<Vec<u64>>;

  async fn sprints_for_board(&self, board_id: u64, states: &[SprintState])
    -> Result<Vec<ApiSprint>>;

  async fn current_user(&self) -> Result<User>;

  async fn move_to_backlog(&self, keys: &[String]) -> Result<()>;

  async fn create_sprint(&self, sprint: &SprintPayload) -> Result<()>;
}
