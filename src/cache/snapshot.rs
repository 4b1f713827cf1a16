use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::jira::{Issue, Sprint};

/// Everything mirrored from Jira, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  /// Seconds since epoch of the last full refresh, 0 if never refreshed
  pub timestamp: i64,
  pub issues: Vec<Issue>,
  pub issue_by_key: HashMap<String, Issue>,
  pub epics: Vec<Issue>,
  pub initiatives: Vec<Issue>,
  pub sprint_issues: Vec<Issue>,
  pub sprints: Vec<Sprint>,
  pub sprints_by_name: HashMap<String, Sprint>,
  /// Board of the configured project, 0 if not resolved yet
  pub board_id: u64,
  pub last_issue_created: Option<String>,
}

impl Snapshot {
  /// A snapshot is stale once it is older than twice the refresh interval.
  ///
  /// The slack tolerates one missed daemon cycle before foreground commands
  /// fall back to fetching synchronously.
  pub fn is_stale(&self, now: i64, refresh_interval: Duration) -> bool {
    let expiry = 2 * refresh_interval.as_secs() as i64;
    now - self.timestamp > expiry
  }

  /// Replace the issues and rebuild the key index.
  pub fn set_issues(&mut self, issues: Vec<Issue>) {
    self.issue_by_key = issues
      .iter()
      .map(|issue| (issue.key.clone(), issue.clone()))
      .collect();
    self.issues = issues;
  }

  /// Replace the sprints and rebuild the name index.
  pub fn set_sprints(&mut self, sprints: Vec<Sprint>) {
    self.sprints_by_name = sprints
      .iter()
      .map(|sprint| (sprint.name.clone(), sprint.clone()))
      .collect();
    self.sprints = sprints;
  }

  /// Take over a freshly refreshed snapshot.
  ///
  /// `last_issue_created` is only ever set by interactive commands, so the
  /// value already persisted wins over the one carried by `fresh`.
  pub fn adopt(&mut self, fresh: &Snapshot) {
    let created = self
      .last_issue_created
      .take()
      .or_else(|| fresh.last_issue_created.clone());
    *self = Snapshot {
      last_issue_created: created,
      ..fresh.clone()
    };
  }

  /// Look up an issue in the sprint or in the assigned issues.
  pub fn find_issue(&self, key: &str) -> Option<&Issue> {
    self
      .issue_by_key
      .get(key)
      .or_else(|| self.sprint_issues.iter().find(|issue| issue.key == key))
  }
}

#[cfg(test)]
pub(crate) fn issue(key: &str, status: &str, summary: &str) -> Issue {
  use crate::jira::{Status, Workflow};
  use std::sync::Arc;

  Issue {
    key: key.into(),
    summary: summary.into(),
    priority: "Major".into(),
    status: Status::new(status, false),
    workflow: Arc::new(Workflow::default()),
    sprint: 0,
  }
}
