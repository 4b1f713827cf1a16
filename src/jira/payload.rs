//! Request bodies for issue and sprint creation.
//!
//! Epic link, sprint, story points, epic name and parent link live in custom
//! fields whose names are configuration. The builder is the only place those names are applied.

use chrono::{Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{Config, CustomFieldsConfig};
use crate::error::{Error, Result};

use super::types::{NewIssue, User};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyRef {
  pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameRef {
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserRef {
  AccountId {
    #[serde(rename = "accountId")]
    account_id: String,
  },
  Name {
    name: String,
  },
}

impl UserRef {
  /// Jira Cloud identifies users by account id, Server by name.
  fn from_user(user: &User) -> Option<Self> {
    if let Some(account_id) = &user.account_id {
      return Some(UserRef::AccountId {
        account_id: account_id.clone(),
      });
    }
    user.name.as_ref().map(|name| UserRef::Name { name: name.clone() })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueFieldsPayload {
  pub project: KeyRef,
  #[serde(rename = "issuetype")]
  pub issue_type: NameRef,
  pub summary: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee: Option<UserRef>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reporter: Option<UserRef>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub labels: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub components: Vec<NameRef>,
  #[serde(rename = "duedate", skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(flatten)]
  pub custom: BTreeMap<String, Value>,
}

/// Body of `POST /issue`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuePayload {
  pub fields: IssueFieldsPayload,
}

impl IssuePayload {
  pub fn summary(&self) -> &str {
    &self.fields.summary
  }
}

/// Builds [`IssuePayload`]s for one project configuration.
pub struct IssuePayloadBuilder<'a> {
  config: &'a Config,
  user: &'a User,
}

impl<'a> IssuePayloadBuilder<'a> {
  pub fn new(config: &'a Config, user: &'a User) -> Self {
    Self { config, user }
  }

  fn custom_fields(&self) -> &CustomFieldsConfig {
    &self.config.custom_fields
  }

  pub fn build(&self, issue: &NewIssue) -> IssuePayload {
    let mut custom = BTreeMap::new();
    if let Some(points) = issue.story_points {
      custom.insert(self.custom_fields().story_points.clone(), Value::from(points));
    }
    if let Some(epic) = &issue.epic {
      custom.insert(self.custom_fields().epics.clone(), Value::from(epic.as_str()));
    }
    if let Some(sprint) = issue.sprint {
      custom.insert(self.custom_fields().sprints.clone(), Value::from(sprint));
    }
    let fields = self.custom_fields();
    if let Some(name) = issue.epic_name.as_ref().filter(|_| !fields.epic_name.is_empty()) {
      custom.insert(fields.epic_name.clone(), Value::from(name.as_str()));
    }
    if let Some(parent) = issue.parent.as_ref().filter(|_| !fields.parent_link.is_empty()) {
      custom.insert(fields.parent_link.clone(), Value::from(parent.as_str()));
    }

    let user = UserRef::from_user(self.user);
    IssuePayload {
      fields: IssueFieldsPayload {
        project: KeyRef {
          key: self.config.project.clone(),
        },
        issue_type: NameRef {
          name: issue.issue_type.clone(),
        },
        summary: issue.summary.clone(),
        description: issue.description.clone(),
        assignee: user.clone(),
        reporter: user,
        labels: self.config.labels.clone(),
        components: self
          .config
          .components
          .iter()
          .map(|name| NameRef { name: name.clone() })
          .collect(),
        due_date: issue
          .due_date
          .map(|d| d.with_timezone(&Local).format("%Y-%m-%d").to_string()),
        custom,
      },
    }
  }
}

/// Body of `POST /rest/agile/1.0/sprint`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintPayload {
  pub name: String,
  pub start_date: String,
  pub end_date: String,
  pub origin_board_id: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub goal: Option<String>,
}

const SPRINT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

impl SprintPayload {
  /// A sprint starting at local midnight of `month/day` in `year`.
  ///
  /// The end date covers `duration_days` full days after the start day, and
  /// the name is suffixed with the start date as `M/D`.
  pub fn new(
    name: &str,
    year: i32,
    month: u32,
    day: u32,
    duration_days: u32,
    board_id: u64,
  ) -> Result<Self> {
    let invalid = || Error::DomainMismatch(format!("invalid date {}/{}", month, day));
    let start_day = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let end_day = start_day + Duration::days(i64::from(duration_days) + 1);
    let start = local_midnight(start_day).ok_or_else(invalid)?;
    let end = local_midnight(end_day).ok_or_else(invalid)?;

    Ok(Self {
      name: format!("{} {}/{}", name, month, day),
      start_date: start.format(SPRINT_DATE_FORMAT).to_string(),
      end_date: end.format(SPRINT_DATE_FORMAT).to_string(),
      origin_board_id: board_id,
      goal: None,
    })
  }
}

fn local_midnight(day: NaiveDate) -> Option<chrono::DateTime<Local>> {
  day
    .and_hms_opt(0, 0, 0)
    .and_then(|dt| Local.from_local_datetime(&dt).earliest())
}
