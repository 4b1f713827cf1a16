//! In-memory [`JiraApi`] for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::api::{JiraApi, SearchPage};
use super::api_types::{ApiIssue, ApiSprint};
use super::payload::{IssuePayload, SprintPayload};
use super::types::{SprintState, User};

/// Serves canned search results keyed by a JQL fragment and records every
/// mutation it receives.
#[derive(Default)]
pub struct FakeApi {
  results: Vec<(String, Vec<ApiIssue>)>,
  failing_queries: Vec<String>,
  stalling_queries: Vec<String>,
  failing_page: Option<u64>,
  boards: Vec<u64>,
  sprints: Vec<ApiSprint>,
  rejected_summaries: Vec<String>,

  pub search_calls: AtomicUsize,
  pub create_calls: AtomicUsize,
  pub board_calls: AtomicUsize,
  pub sprint_calls: AtomicUsize,
  pub queries: Mutex<Vec<String>>,
  pub transitions: Mutex<Vec<(String, String)>>,
  pub backlog: Mutex<Vec<String>>,
  pub created_sprints: Mutex<Vec<SprintPayload>>,
}

impl FakeApi {
  /// Answer queries containing `fragment` with `issues`, paginated.
  pub fn with_search(mut self, fragment: &str, issues: Vec<ApiIssue>) -> Self {
    self.results.push((fragment.to_string(), issues));
    self
  }

  /// Fail every query containing `fragment`.
  pub fn failing_search(mut self, fragment: &str) -> Self {
    self.failing_queries.push(fragment.to_string());
    self
  }

  /// Never answer queries containing `fragment`.
  pub fn stalling_search(mut self, fragment: &str) -> Self {
    self.stalling_queries.push(fragment.to_string());
    self
  }

  /// Fail the page starting at `start_at`.
  pub fn failing_page(mut self, start_at: u64) -> Self {
    self.failing_page = Some(start_at);
    self
  }

  pub fn with_boards(mut self, boards: Vec<u64>) -> Self {
    self.boards = boards;
    self
  }

  pub fn with_sprints(mut self, sprints: Vec<ApiSprint>) -> Self {
    self.sprints = sprints;
    self
  }

  /// Reject creation of issues with this summary.
  pub fn rejecting(mut self, summary: &str) -> Self {
    self.rejected_summaries.push(summary.to_string());
    self
  }
}

#[async_trait]
impl JiraApi for FakeApi {
  async fn search(&self, jql: &str, start_at: u64, max_results: u32) -> Result<SearchPage> {
    self.search_calls.fetch_add(1, Ordering::SeqCst);
    self.queries.lock().unwrap().push(jql.to_string());

    if self.stalling_queries.iter().any(|f| jql.contains(f.as_str())) {
      return std::future::pending().await;
    }

    if self.failing_queries.iter().any(|f| jql.contains(f.as_str()))
      || self.failing_page == Some(start_at)
    {
      return Err(Error::remote(500, "Internal server error"));
    }

    let issues = self
      .results
      .iter()
      .find(|(fragment, _)| jql.contains(fragment.as_str()))
      .map(|(_, issues)| issues.as_slice())
      .unwrap_or_default();

    let start = (start_at as usize).min(issues.len());
    let end = (start + max_results as usize).min(issues.len());
    Ok(SearchPage {
      issues: issues[start..end].to_vec(),
      total: issues.len() as u64,
    })
  }

  async fn create_issue(&self, payload: &IssuePayload) -> Result<String> {
    let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
    if self
      .rejected_summaries
      .iter()
      .any(|s| s == payload.summary())
    {
      return Err(Error::remote(
        400,
        format!("summary rejected: {}", payload.summary()),
      ));
    }
    Ok(format!("KONG-{}", 100 + n))
  }

  async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
    self
      .transitions
      .lock()
      .unwrap()
      .push((key.to_string(), transition_id.to_string()));
    Ok(())
  }

  async fn boards_for_project(&self, _project: &str) -> Result<Vec<u64>> {
    self.board_calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.boards.clone())
  }

  async fn sprints_for_board(
    &self,
    _board_id: u64,
    _states: &[SprintState],
  ) -> Result<Vec<ApiSprint>> {
    self.sprint_calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.sprints.clone())
  }

  async fn current_user(&self) -> Result<User> {
    Ok(User {
      account_id: Some("king".into()),
      name: None,
      display_name: "King".into(),
    })
  }

  async fn move_to_backlog(&self, keys: &[String]) -> Result<()> {
    self.backlog.lock().unwrap().extend(keys.iter().cloned());
    Ok(())
  }

  async fn create_sprint(&self, sprint: &SprintPayload) -> Result<()> {
    self.created_sprints.lock().unwrap().push(sprint.clone());
    Ok(())
  }
}
