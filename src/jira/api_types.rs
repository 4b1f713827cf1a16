//! Serde-deserializable types matching Jira API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on what the snapshot stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{acronym, Issue, Sprint, SprintState, Status, Transition, User, Workflow};

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiStatusCategory {
  #[serde(default)]
  pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiStatus {
  pub name: String,
  #[serde(rename = "statusCategory")]
  pub status_category: Option<ApiStatusCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPriority {
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
  #[serde(rename = "accountId")]
  pub account_id: Option<String>,
  pub name: Option<String>,
  #[serde(rename = "displayName", default)]
  pub display_name: String,
}

// ============================================================================
// Search endpoint
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiIssueFields {
  #[serde(default)]
  pub summary: String,
  pub status: Option<ApiStatus>,
  pub priority: Option<ApiPriority>,
  // Catch-all for custom fields (like sprint membership)
  #[serde(flatten)]
  pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTransitionTo {
  pub name: String,
  #[serde(default)]
  pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTransition {
  pub id: String,
  pub to: ApiTransitionTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiIssue {
  pub key: String,
  #[serde(default)]
  pub fields: ApiIssueFields,
  #[serde(default)]
  pub transitions: Vec<ApiTransition>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub issues: Vec<ApiIssue>,
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiCreatedIssue {
  pub key: String,
}

// ============================================================================
// Agile endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiBoard {
  pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiBoardsResponse {
  #[serde(default)]
  pub values: Vec<ApiBoard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSprint {
  pub id: u64,
  pub name: String,
  pub state: String,
  #[serde(rename = "endDate")]
  pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSprintsResponse {
  #[serde(default)]
  pub values: Vec<ApiSprint>,
  #[serde(rename = "isLast", default = "default_true")]
  pub is_last: bool,
}

fn default_true() -> bool {
  true
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiTransition> for Transition {
  fn from(t: ApiTransition) -> Self {
    Transition {
      id: t.id,
      acronym: acronym(&t.to.name),
      name: t.to.name,
      description: t.to.description,
    }
  }
}

impl From<ApiUser> for User {
  fn from(u: ApiUser) -> Self {
    User {
      account_id: u.account_id,
      name: u.name,
      display_name: u.display_name,
    }
  }
}

impl ApiSprint {
  /// Returns None for sprints in a state we do not know about.
  pub fn into_sprint(self) -> Option<Sprint> {
    let state = SprintState::parse(&self.state)?;
    Some(Sprint {
      id: self.id,
      name: self.name,
      state,
      end_date: self.end_date.as_deref().and_then(parse_jira_datetime),
    })
  }
}

/// Convert one fetch batch into issues.
///
/// The workflow is per project, so every issue of the batch shares the
/// transitions of the first issue that carries any.
pub fn into_issues(batch: Vec<ApiIssue>, sprints_field: &str) -> Vec<Issue> {
  let transitions = batch
    .iter()
    .find(|issue| !issue.transitions.is_empty())
    .map(|issue| {
      issue
        .transitions
        .iter()
        .cloned()
        .map(Transition::from)
        .collect()
    })
    .unwrap_or_default();
  let workflow = Arc::new(Workflow::new(transitions));

  batch
    .into_iter()
    .map(|issue| {
      let f = issue.fields;
      let sprint = extract_sprint_id(f.extra.get(sprints_field)).unwrap_or(0);
      let status = f
        .status
        .map(|s| {
          let is_done = s
            .status_category
            .map(|c| c.key == "done")
            .unwrap_or(false);
          Status::new(s.name, is_done)
        })
        .unwrap_or_default();
      Issue {
        key: issue.key,
        summary: f.summary,
        priority: f.priority.map(|p| p.name).unwrap_or_default(),
        status,
        workflow: Arc::clone(&workflow),
        sprint,
      }
    })
    .collect()
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract the current sprint id from the sprints custom field.
/// The field can be:
/// - An array of sprint objects (Jira Cloud) or legacy sprint strings
/// - A single sprint object, string or number
/// - null
///
/// The active sprint wins, otherwise the last one listed.
fn extract_sprint_id(value: Option<&Value>) -> Option<u64> {
  let value = value?;

  if let Some(items) = value.as_array() {
    let parsed: Vec<(u64, bool)> = items.iter().filter_map(parse_sprint_ref).collect();
    return parsed
      .iter()
      .find(|(_, active)| *active)
      .or_else(|| parsed.last())
      .map(|(id, _)| *id);
  }

  parse_sprint_ref(value).map(|(id, _)| id)
}

fn parse_sprint_ref(value: &Value) -> Option<(u64, bool)> {
  if let Some(id) = value.as_u64() {
    return Some((id, false));
  }

  if let Some(obj) = value.as_object() {
    let id = obj.get("id").and_then(|v| v.as_u64())?;
    let active = obj
      .get("state")
      .and_then(|v| v.as_str())
      .map(|s| s.eq_ignore_ascii_case("active"))
      .unwrap_or(false);
    return Some((id, active));
  }

  // Legacy format: "com.atlassian.greenhopper.service.sprint.Sprint@1f[id=12,state=ACTIVE,...]"
  let s = value.as_str()?;
  let attrs = s.split_once('[').map(|(_, rest)| rest.trim_end_matches(']'))?;
  let mut id = None;
  let mut active = false;
  for pair in attrs.split(',') {
    match pair.split_once('=') {
      Some(("id", v)) => id = v.parse().ok(),
      Some(("state", v)) => active = v.eq_ignore_ascii_case("active"),
      _ => {}
    }
  }
  id.map(|id| (id, active))
}

/// Jira emits both RFC 3339 and "+0000"-style offsets depending on the version.
fn parse_jira_datetime(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

#[cfg(test)]
pub(crate) fn api_issue(key: &str, status: &str) -> ApiIssue {
  ApiIssue {
    key: key.to_string(),
    fields: ApiIssueFields {
      summary: "The epic clash between two titans".into(),
      status: Some(ApiStatus {
        name: status.into(),
        status_category: None,
      }),
      priority: Some(ApiPriority {
        name: "Major".into(),
      }),
      extra: HashMap::new(),
    },
    transitions: vec![
      ApiTransition {
        id: "1".into(),
        to: ApiTransitionTo {
          name: "To Do".into(),
          description: "Ticket has yet to be started.".into(),
        },
      },
      ApiTransition {
        id: "2".into(),
        to: ApiTransitionTo {
          name: "In Progress".into(),
          description: "This issue is currently being worked on.".into(),
        },
      },
    ],
  }
}
