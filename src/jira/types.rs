use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Acronym reserved for moving an issue out of its sprint into the backlog.
pub const BACKLOG_ACRONYM: &str = "ice";

/// Issue reduced to the fields the snapshot needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub key: String,
  pub summary: String,
  pub priority: String,
  pub status: Status,
  /// Shared by every issue of the same fetch batch
  pub workflow: Arc<Workflow>,
  /// Sprint the issue belongs to, 0 if unassigned
  pub sprint: u64,
}

impl Issue {
  pub fn transition_by_acronym(&self, acronym: &str) -> Option<&Transition> {
    self.workflow.by_acronym.get(acronym)
  }

  /// Position of the issue's status in the workflow, unknown statuses last.
  pub fn rank(&self) -> usize {
    self
      .workflow
      .rank_by_status
      .get(&self.status.name)
      .copied()
      .unwrap_or(usize::MAX)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub name: String,
  pub acronym: String,
  pub is_done: bool,
}

impl Status {
  pub fn new(name: impl Into<String>, is_done: bool) -> Self {
    let name = name.into();
    Self {
      acronym: acronym(&name),
      name,
      is_done,
    }
  }
}

/// A legal workflow state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
  pub id: String,
  /// Target status name
  pub name: String,
  pub description: String,
  pub acronym: String,
}

/// Per-project workflow: the ordered transitions and the indices derived from
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub transitions: Vec<Transition>,
  pub by_acronym: HashMap<String, Transition>,
  pub rank_by_status: HashMap<String, usize>,
}

impl Workflow {
  pub fn new(transitions: Vec<Transition>) -> Self {
    let by_acronym = transitions
      .iter()
      .map(|t| (t.acronym.clone(), t.clone()))
      .collect();
    let rank_by_status = transitions
      .iter()
      .enumerate()
      .map(|(rank, t)| (t.name.clone(), rank))
      .collect();
    Self {
      transitions,
      by_acronym,
      rank_by_status,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
  Active,
  Future,
  Closed,
}

impl SprintState {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "active" => Some(Self::Active),
      "future" => Some(Self::Future),
      "closed" => Some(Self::Closed),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprint {
  pub id: u64,
  pub name: String,
  pub state: SprintState,
  pub end_date: Option<DateTime<Utc>>,
}

/// The authenticated user, assignee and reporter of created issues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
  pub account_id: Option<String>,
  pub name: Option<String>,
  pub display_name: String,
}

/// Issue to be created, with epic, sprint and parent already resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIssue {
  pub issue_type: String,
  pub summary: String,
  pub description: String,
  pub story_points: Option<f64>,
  pub epic: Option<String>,
  pub sprint: Option<u64>,
  pub due_date: Option<DateTime<Utc>>,
  /// Key of the initiative an epic belongs to
  pub parent: Option<String>,
  /// Epic name, required by Jira Server for epics
  pub epic_name: Option<String>,
}

/// Transition to apply to one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTransition {
  pub key: String,
  pub transition: Transition,
}

/// Short, lowercase form of a status name: the initial of every word.
///
/// "In Progress" becomes "ip", "Done" becomes "d".
pub fn acronym(name: &str) -> String {
  name
    .split_whitespace()
    .filter_map(|word| word.chars().next())
    .flat_map(char::to_lowercase)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_acronym() {
    assert_eq!(acronym("To Do"), "td");
    assert_eq!(acronym("In Progress"), "ip");
    assert_eq!(acronym("Done"), "d");
    assert_eq!(acronym("  code   review "), "cr");
    assert_eq!(acronym(""), "");
  }

  #[test]
  fn test_workflow_indices() {
    let workflow = Workflow::new(vec![
      Transition {
        id: "1".into(),
        name: "To Do".into(),
        description: String::new(),
        acronym: "td".into(),
      },
      Transition {
        id: "2".into(),
        name: "In Progress".into(),
        description: String::new(),
        acronym: "ip".into(),
      },
    ]);
    assert_eq!(workflow.by_acronym["ip"].id, "2");
    assert_eq!(workflow.rank_by_status["To Do"], 0);
    assert_eq!(workflow.rank_by_status["In Progress"], 1);
  }

  #[test]
  fn test_sprint_state_parse() {
    assert_eq!(SprintState::parse("ACTIVE"), Some(SprintState::Active));
    assert_eq!(SprintState::parse("future"), Some(SprintState::Future));
    assert_eq!(SprintState::parse("unknown"), None);
  }
}
