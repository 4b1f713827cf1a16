use futures::stream::{FuturesUnordered, StreamExt};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

use super::api::JiraApi;
use super::api_types::into_issues;
use super::payload::{IssuePayloadBuilder, SprintPayload};
use super::rest::RestApi;
use super::types::{Issue, IssueTransition, NewIssue, Sprint, SprintState};

/// Jira client wrapper
///
/// Turns snapshot-level requests into calls against a [`JiraApi`] and
/// flattens paginated results.
#[derive(Clone)]
pub struct JiraClient {
  api: Arc<dyn JiraApi>,
  config: Arc<Config>,
}

impl JiraClient {
  pub fn new(config: Config) -> Result<Self> {
    let api = RestApi::new(&config)?;
    Ok(Self::with_api(Arc::new(api), config))
  }

  pub fn with_api(api: Arc<dyn JiraApi>, config: Config) -> Self {
    Self {
      api,
      config: Arc::new(config),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Search for issues using JQL, following pages until `total` is reached.
  ///
  /// A failing page aborts the whole search.
  pub async fn search(&self, jql: &str) -> Result<Vec<Issue>> {
    let page_size = self.config.page_size;
    let mut all_issues = Vec::new();
    let mut start_at = 0u64;

    loop {
      let page = self.api.search(jql, start_at, page_size).await?;
      let issues_count = page.issues.len() as u64;
      all_issues.extend(page.issues);

      start_at += issues_count;
      if issues_count == 0 || start_at >= page.total {
        break;
      }
    }

    debug!(jql, count = all_issues.len(), "search complete");
    Ok(into_issues(all_issues, &self.config.custom_fields.sprints))
  }

  /// Open tasks, stories and bugs assigned to the current user.
  pub async fn list_issues(&self, project: &str) -> Result<Vec<Issue>> {
    self
      .search(&jql(&[
        format!("project = {}", project),
        "issueType IN (Task, Story, Bug)".into(),
        "assignee = currentUser()".into(),
        "status != Closed".into(),
      ]))
      .await
  }

  pub async fn list_epics(&self, project: &str) -> Result<Vec<Issue>> {
    self.search(&self.parent_jql(project, "Epic")).await
  }

  pub async fn list_initiatives(&self, project: &str) -> Result<Vec<Issue>> {
    self.search(&self.parent_jql(project, "Initiative")).await
  }

  /// Issues of the configured project in any open sprint.
  pub async fn list_sprint_issues(&self) -> Result<Vec<Issue>> {
    self
      .search(&jql(&[
        format!("project = {}", self.config.project),
        "issueType IN (Story, Bug)".into(),
        "assignee = currentUser()".into(),
        "status != Closed".into(),
        "sprint in openSprints()".into(),
      ]))
      .await
  }

  fn parent_jql(&self, project: &str, issue_type: &str) -> String {
    let mut conditions = vec![
      format!("project = {}", project),
      format!("issueType = {}", issue_type),
      "status != Closed".to_string(),
    ];
    if !self.config.labels.is_empty() {
      conditions.push(format!("labels IN ({})", self.config.labels.join(",")));
    }
    jql(&conditions)
  }

  /// Active and future sprints whose name contains the configured keyword.
  pub async fn list_sprints(&self, board_id: u64) -> Result<Vec<Sprint>> {
    let keyword = &self.config.sprint_keyword;
    let sprints = self.list_all_sprints(board_id).await?;
    Ok(
      sprints
        .into_iter()
        .filter(|s| s.name.contains(keyword.as_str()))
        .collect(),
    )
  }

  /// Active and future sprints of a board, unfiltered.
  pub async fn list_all_sprints(&self, board_id: u64) -> Result<Vec<Sprint>> {
    let sprints = self
      .api
      .sprints_for_board(board_id, &[SprintState::Active, SprintState::Future])
      .await?;
    Ok(sprints.into_iter().filter_map(|s| s.into_sprint()).collect())
  }

  /// The first board associated with a project.
  pub async fn get_board_id(&self, project: &str) -> Result<u64> {
    let boards = self.api.boards_for_project(project).await?;
    boards
      .first()
      .copied()
      .ok_or_else(|| Error::remote(404, format!("no board found for project {}", project)))
  }

  /// Create issues concurrently and return the key of the last one created.
  ///
  /// Each created issue is reported on `out` as it completes. The first
  /// rejection is returned after every request has finished; issues created
  /// before or alongside it stay created.
  pub async fn create_issues<W: Write + Send>(
    &self,
    issues: &[NewIssue],
    out: &mut W,
  ) -> Result<Option<String>> {
    if issues.is_empty() {
      return Ok(None);
    }
    let user = self.api.current_user().await?;
    let builder = IssuePayloadBuilder::new(&self.config, &user);
    let payloads: Vec<_> = issues.iter().map(|issue| builder.build(issue)).collect();

    let mut pending: FuturesUnordered<_> = payloads
      .iter()
      .map(|payload| async move { (payload.summary(), self.api.create_issue(payload).await) })
      .collect();

    let mut first_error = None;
    let mut last_created = None;
    while let Some((summary, result)) = pending.next().await {
      match result {
        Ok(key) => {
          if let Err(e) = writeln!(out, "Created {} - {}", key, summary) {
            first_error.get_or_insert(Error::from(e));
          }
          last_created = Some(key);
        }
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(last_created),
    }
  }

  /// Apply transitions concurrently, same reporting rules as
  /// [`JiraClient::create_issues`].
  pub async fn transition_issues<W: Write + Send>(
    &self,
    batch: &[IssueTransition],
    out: &mut W,
  ) -> Result<()> {
    let mut pending: FuturesUnordered<_> = batch
      .iter()
      .map(|t| async move {
        let result = self.api.transition_issue(&t.key, &t.transition.id).await;
        (t, result)
      })
      .collect();

    let mut first_error = None;
    while let Some((t, result)) = pending.next().await {
      match result {
        Ok(()) => {
          if let Err(e) = writeln!(out, "Moved {} to {}", t.key, t.transition.name) {
            first_error.get_or_insert(Error::from(e));
          }
        }
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
    }

    first_error.map_or(Ok(()), Err)
  }

  pub async fn move_issues_to_backlog<W: Write + Send>(
    &self,
    keys: &[String],
    out: &mut W,
  ) -> Result<()> {
    if keys.is_empty() {
      return Ok(());
    }
    self.api.move_to_backlog(keys).await?;
    for key in keys {
      writeln!(out, "Moved {} to backlog", key)?;
    }
    Ok(())
  }

  /// Create a sprint on `board_id` starting at `month/day` of the current year.
  pub async fn create_sprint(&self, name: &str, month: u32, day: u32, board_id: u64) -> Result<()> {
    use chrono::Datelike;

    let year = chrono::Local::now().year();
    let payload = SprintPayload::new(
      name,
      year,
      month,
      day,
      self.config.sprint_duration,
      board_id,
    )?;
    self.api.create_sprint(&payload).await
  }
}

fn jql(conditions: &[String]) -> String {
  conditions.join(" AND ")
}
