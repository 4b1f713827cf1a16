//! Command handlers behind the CLI.

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use dialoguer::{Input, Password};
use std::io::{self, Write};
use std::process::Command;

use crate::cache::{CacheLayer, FileStore, Snapshot, SnapshotRepository};
use crate::config::Config;
use crate::daemon::Daemon;
use crate::error::Error;
use crate::jira::{IssueTransition, JiraClient, NewIssue, BACKLOG_ACRONYM};
use crate::output;

/// Fields of `kong issues new`.
#[derive(Debug, Clone, Default)]
pub struct IssueArgs {
  pub summary: String,
  pub description: String,
  /// 1-based index into the cached epics, 0 for none
  pub epic: Option<usize>,
  /// 1-based index into the cached sprints, 0 for none
  pub sprint: Option<usize>,
  pub points: Option<f64>,
}

/// Fields of `kong epics new`.
#[derive(Debug, Clone, Default)]
pub struct EpicArgs {
  pub summary: String,
  pub description: String,
  /// 1-based index into the cached initiatives, 0 for none
  pub initiative: Option<usize>,
}

fn client() -> Result<JiraClient> {
  Ok(JiraClient::new(Config::load()?)?)
}

fn cache() -> Result<CacheLayer<FileStore>> {
  Ok(CacheLayer::open(client()?, FileStore::open())?)
}

pub async fn configure() -> Result<()> {
  let path = Config::path()?;
  let mut config = match Config::read(&path) {
    Ok(config) => config,
    Err(Error::ConfigMissing) => Config::default(),
    Err(e) => return Err(e.into()),
  };

  println!("Configure Jira using basic authentication.");
  config.endpoint = prompt("Endpoint", &config.endpoint)?;
  config.username = prompt("Username", &config.username)?;
  let password = Password::new()
    .with_prompt("Password (leave empty to keep)")
    .allow_empty_password(true)
    .interact()?;
  if !password.is_empty() {
    config.password = password;
  }

  config.project = prompt("Project", &config.project)?;
  config.issue_type = prompt("Issue type", &config.issue_type)?;
  config.labels = split_list(&prompt("Labels", &config.labels.join(","))?);
  config.components = split_list(&prompt("Components", &config.components.join(","))?);

  config.custom_fields.epics = prompt("Epics custom field", &config.custom_fields.epics)?;
  config.custom_fields.sprints = prompt("Sprints custom field", &config.custom_fields.sprints)?;
  config.custom_fields.story_points = prompt(
    "Story points custom field",
    &config.custom_fields.story_points,
  )?;
  config.custom_fields.epic_name = prompt(
    "Epic name custom field (optional)",
    &config.custom_fields.epic_name,
  )?;
  config.custom_fields.parent_link = prompt(
    "Parent link custom field (optional)",
    &config.custom_fields.parent_link,
  )?;

  config.sprint_keyword = prompt("Sprint keyword", &config.sprint_keyword)?;
  config.sprint_duration = Input::new()
    .with_prompt("Sprint duration in days")
    .default(config.sprint_duration)
    .interact_text()?;

  config.validate()?;
  config.write(&path)?;
  println!("Configuration written to {}", path.display());
  Ok(())
}

fn prompt(label: &str, current: &str) -> Result<String> {
  let value: String = Input::new()
    .with_prompt(label)
    .with_initial_text(current)
    .allow_empty(true)
    .interact_text()?;
  Ok(value.trim().to_string())
}

fn split_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

pub async fn daemon() -> Result<()> {
  let daemon = Daemon::new(client()?, FileStore::open());
  daemon.run().await;
  Ok(())
}

pub async fn issues(project: Option<String>) -> Result<()> {
  let mut out = io::stdout();
  match project {
    Some(project) => {
      let issues = client()?.list_issues(&project).await?;
      output::print_issues(&mut out, &issues)?;
    }
    None => {
      let mut cache = cache()?;
      output::print_issues(&mut out, cache.get_issues().await?)?;
    }
  }
  Ok(())
}

pub async fn epics(project: Option<String>) -> Result<()> {
  let mut out = io::stdout();
  match project {
    Some(project) => {
      let epics = client()?.list_epics(&project).await?;
      output::print_indexed_issues(&mut out, &epics)?;
    }
    None => {
      let mut cache = cache()?;
      output::print_indexed_issues(&mut out, cache.get_epics().await?)?;
    }
  }
  Ok(())
}

pub async fn initiatives(project: Option<String>) -> Result<()> {
  let mut out = io::stdout();
  match project {
    Some(project) => {
      let initiatives = client()?.list_initiatives(&project).await?;
      output::print_indexed_issues(&mut out, &initiatives)?;
    }
    None => {
      let mut cache = cache()?;
      output::print_indexed_issues(&mut out, cache.get_initiatives().await?)?;
    }
  }
  Ok(())
}

pub async fn sprints(project: Option<String>) -> Result<()> {
  let mut out = io::stdout();
  match project {
    Some(project) => {
      let client = client()?;
      let board_id = client.get_board_id(&project).await?;
      let sprints = client.list_sprints(board_id).await?;
      output::print_sprints(&mut out, &sprints)?;
    }
    None => {
      let mut cache = cache()?;
      output::print_sprints(&mut out, cache.get_sprints().await?)?;
    }
  }
  Ok(())
}

pub async fn sprint(include_done: bool) -> Result<()> {
  let mut cache = cache()?;
  let issues = cache.get_sprint_issues().await?;
  output::print_sprint_issues(&mut io::stdout(), issues, include_done)?;
  Ok(())
}

/// Create one issue. Epic and sprint indices refer to the listings of a
/// freshly loaded snapshot.
pub async fn new_issue(args: IssueArgs) -> Result<()> {
  let mut cache = cache()?;
  cache.load_blocking().await?;
  let issue = resolve_issue(cache.snapshot(), &cache.client().config().issue_type, args)?;

  let created = cache
    .client()
    .create_issues(&[issue], &mut io::stdout())
    .await?;
  if let Some(key) = created {
    cache.record_created(key)?;
  }
  Ok(())
}

fn resolve_issue(
  snapshot: &Snapshot,
  issue_type: &str,
  args: IssueArgs,
) -> Result<NewIssue, Error> {
  let epic = pick(&snapshot.epics, args.epic, "epic or initiative does not exist")?;
  let sprint = pick(&snapshot.sprints, args.sprint, "sprint does not exist")?;
  Ok(NewIssue {
    issue_type: issue_type.to_string(),
    summary: args.summary,
    description: args.description,
    story_points: args.points,
    epic: epic.map(|epic| epic.key.clone()),
    sprint: sprint.map(|sprint| sprint.id),
    due_date: sprint.and_then(|sprint| sprint.end_date),
    ..Default::default()
  })
}

/// Create one epic, optionally under an initiative listed by
/// `kong initiatives`.
pub async fn new_epic(args: EpicArgs) -> Result<()> {
  let mut cache = cache()?;
  cache.load_blocking().await?;
  let epic = resolve_epic(cache.snapshot(), cache.client().config(), args)?;

  let created = cache
    .client()
    .create_issues(&[epic], &mut io::stdout())
    .await?;
  if let Some(key) = created {
    cache.record_created(key)?;
  }
  Ok(())
}

fn resolve_epic(snapshot: &Snapshot, config: &Config, args: EpicArgs) -> Result<NewIssue, Error> {
  let initiative = pick(
    &snapshot.initiatives,
    args.initiative,
    "epic or initiative does not exist",
  )?;
  if initiative.is_some() && config.custom_fields.parent_link.is_empty() {
    return Err(Error::InvalidConfig(
      "customFields.parentLink is not set".into(),
    ));
  }
  Ok(NewIssue {
    issue_type: "Epic".into(),
    epic_name: Some(args.summary.clone()),
    summary: args.summary,
    description: args.description,
    parent: initiative.map(|initiative| initiative.key.clone()),
    ..Default::default()
  })
}

/// Resolve a 1-based index, where absent or 0 means "none".
fn pick<'a, T>(
  items: &'a [T],
  index: Option<usize>,
  mismatch: &str,
) -> Result<Option<&'a T>, Error> {
  match index {
    None | Some(0) => Ok(None),
    Some(i) => items
      .get(i - 1)
      .map(Some)
      .ok_or_else(|| Error::DomainMismatch(format!("{}: {}", mismatch, i))),
  }
}

/// Create a sprint starting at `date` (MM/DD) on the project's board.
pub async fn new_sprint(name: &str, date: &str) -> Result<()> {
  let (month, day) = parse_month_day(date)?;
  let cache = cache()?;
  let board_id = match cache.snapshot().board_id {
    0 => {
      let project = &cache.client().config().project;
      cache.client().get_board_id(project).await?
    }
    board_id => board_id,
  };
  cache
    .client()
    .create_sprint(name, month, day, board_id)
    .await?;
  Ok(())
}

fn parse_month_day(date: &str) -> Result<(u32, u32), Error> {
  let invalid = || Error::DomainMismatch(format!("invalid date {}, expected MM/DD", date));
  let (month, day) = date.split_once('/').ok_or_else(invalid)?;
  let month = month.trim().parse().map_err(|_| invalid())?;
  let day = day.trim().parse().map_err(|_| invalid())?;
  Ok((month, day))
}

/// Transitions and backlog moves requested by `kong sprint move`.
#[derive(Debug, Default, PartialEq)]
struct SprintMoves {
  transitions: Vec<IssueTransition>,
  backlog: Vec<String>,
}

/// Parse `KEY=ACRONYM` pairs against the issues known to the snapshot.
fn plan_moves(snapshot: &Snapshot, moves: &[String]) -> Result<SprintMoves, Error> {
  let mut plan = SprintMoves::default();
  for pair in moves {
    let (key, action) = pair
      .split_once('=')
      .ok_or_else(|| Error::DomainMismatch(format!("expected KEY=STATUS, got {}", pair)))?;
    let key = key.trim();
    let action = action.trim().to_lowercase();

    let issue = snapshot
      .find_issue(key)
      .ok_or_else(|| Error::DomainMismatch(format!("issue does not exist: {}", key)))?;

    if action == issue.status.acronym {
      continue;
    }
    if action == BACKLOG_ACRONYM {
      plan.backlog.push(key.to_string());
      continue;
    }

    let transition = issue.transition_by_acronym(&action).ok_or_else(|| {
      Error::DomainMismatch(format!("transition does not exist: {} for {}", action, key))
    })?;
    plan.transitions.push(IssueTransition {
      key: key.to_string(),
      transition: transition.clone(),
    });
  }
  Ok(plan)
}

pub async fn move_sprint_issues(moves: &[String]) -> Result<()> {
  let mut cache = cache()?;
  cache.get_sprint_issues().await?;
  let plan = plan_moves(cache.snapshot(), moves)?;

  let mut out = io::stdout();
  cache
    .client()
    .move_issues_to_backlog(&plan.backlog, &mut out)
    .await?;
  cache
    .client()
    .transition_issues(&plan.transitions, &mut out)
    .await?;
  Ok(())
}

/// Check out a git branch named after the most recently created issue.
pub fn branch() -> Result<()> {
  let snapshot = FileStore::open().load()?;
  let Some(key) = snapshot.last_issue_created else {
    bail!("no recently created issue");
  };

  let output = Command::new("git")
    .args(["checkout", "-b", key.as_str()])
    .output()
    .wrap_err("failed to run git")?;
  io::stderr().write_all(&output.stderr)?;
  if !output.status.success() {
    bail!("git checkout -b {} failed", key);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::issue;
  use crate::config::test_config;
  use crate::jira::{Issue, Sprint, SprintState, Transition, Workflow};
  use chrono::{TimeZone, Utc};
  use std::sync::Arc;

  fn workflow() -> Arc<Workflow> {
    Arc::new(Workflow::new(
      [("1", "To Do", "td"), ("2", "In Progress", "ip"), ("3", "Done", "d")]
        .iter()
        .map(|(id, name, acronym)| Transition {
          id: id.to_string(),
          name: name.to_string(),
          description: String::new(),
          acronym: acronym.to_string(),
        })
        .collect(),
    ))
  }

  fn sprint_snapshot() -> Snapshot {
    let workflow = workflow();
    let sprint_issue = |key: &str, status: &str| Issue {
      workflow: workflow.clone(),
      ..issue(key, status, "s")
    };
    Snapshot {
      sprint_issues: vec![
        sprint_issue("KONG-1", "To Do"),
        sprint_issue("KONG-2", "In Progress"),
      ],
      epics: vec![issue("KONG-10", "To Do", "epic")],
      sprints: vec![Sprint {
        id: 42,
        name: "Kong 4/1".into(),
        state: SprintState::Active,
        end_date: None,
      }],
      ..Default::default()
    }
  }

  fn moves(pairs: &[&str]) -> Vec<String> {
    pairs.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_plan_moves() {
    let plan = plan_moves(&sprint_snapshot(), &moves(&["KONG-1=ip", "KONG-2=ice"])).unwrap();

    assert_eq!(plan.backlog, vec!["KONG-2".to_string()]);
    assert_eq!(plan.transitions.len(), 1);
    assert_eq!(plan.transitions[0].key, "KONG-1");
    assert_eq!(plan.transitions[0].transition.id, "2");
  }

  #[test]
  fn test_plan_moves_skips_current_status() {
    let plan = plan_moves(&sprint_snapshot(), &moves(&["KONG-1=td", "KONG-2 = IP"])).unwrap();
    assert_eq!(plan, SprintMoves::default());
  }

  #[test]
  fn test_plan_moves_rejects_unknown_input() {
    let snapshot = sprint_snapshot();

    let err = plan_moves(&snapshot, &moves(&["KONG-9=ip"])).unwrap_err();
    assert_eq!(err.to_string(), "issue does not exist: KONG-9");

    let err = plan_moves(&snapshot, &moves(&["KONG-1=zz"])).unwrap_err();
    assert!(matches!(err, Error::DomainMismatch(_)));

    let err = plan_moves(&snapshot, &moves(&["KONG-1"])).unwrap_err();
    assert!(matches!(err, Error::DomainMismatch(_)));
  }

  #[test]
  fn test_resolve_issue_indices() {
    let snapshot = sprint_snapshot();
    let args = IssueArgs {
      summary: "Add command to list issues".into(),
      epic: Some(1),
      sprint: Some(1),
      points: Some(3.0),
      ..Default::default()
    };

    let issue = resolve_issue(&snapshot, "Story", args).unwrap();
    assert_eq!(issue.epic.as_deref(), Some("KONG-10"));
    assert_eq!(issue.sprint, Some(42));
    assert_eq!(issue.story_points, Some(3.0));
    assert_eq!(issue.issue_type, "Story");
  }

  #[test]
  fn test_resolve_issue_zero_means_unassigned() {
    let args = IssueArgs {
      summary: "s".into(),
      epic: Some(0),
      ..Default::default()
    };
    let issue = resolve_issue(&sprint_snapshot(), "Story", args).unwrap();
    assert_eq!(issue.epic, None);
    assert_eq!(issue.sprint, None);
  }

  #[test]
  fn test_resolve_issue_out_of_range() {
    let args = IssueArgs {
      summary: "s".into(),
      sprint: Some(2),
      ..Default::default()
    };
    let err = resolve_issue(&sprint_snapshot(), "Story", args).unwrap_err();
    assert_eq!(err.to_string(), "sprint does not exist: 2");
  }

  #[test]
  fn test_resolve_issue_due_date_is_sprint_end() {
    let end = Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap();
    let mut snapshot = sprint_snapshot();
    snapshot.sprints[0].end_date = Some(end);

    let args = IssueArgs {
      summary: "s".into(),
      sprint: Some(1),
      ..Default::default()
    };
    let issue = resolve_issue(&snapshot, "Story", args).unwrap();
    assert_eq!(issue.due_date, Some(end));

    let unplanned = IssueArgs {
      summary: "s".into(),
      ..Default::default()
    };
    assert_eq!(resolve_issue(&snapshot, "Story", unplanned).unwrap().due_date, None);
  }

  /// The number printed in front of each listed epic or sprint is the one
  /// `--epic` and `--sprint` resolve to.
  #[test]
  fn test_listed_index_resolves_to_listed_row() {
    let mut snapshot = sprint_snapshot();
    snapshot.epics = vec![
      issue("KONG-20", "Done", "late epic"),
      issue("KONG-10", "To Do", "early epic"),
    ];
    snapshot.sprints.push(Sprint {
      id: 43,
      name: "Kong 4/15".into(),
      state: SprintState::Future,
      end_date: None,
    });

    let mut listing = Vec::new();
    output::print_indexed_issues(&mut listing, &snapshot.epics).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    let listed_second = listing.lines().nth(1).unwrap();
    assert!(listed_second.starts_with("2 - KONG-10 "));

    let mut sprints = Vec::new();
    output::print_sprints(&mut sprints, &snapshot.sprints).unwrap();
    let sprints = String::from_utf8(sprints).unwrap();
    assert!(sprints.lines().nth(1).unwrap().starts_with("2 - 43 "));

    let args = IssueArgs {
      summary: "s".into(),
      epic: Some(2),
      sprint: Some(2),
      ..Default::default()
    };
    let issue = resolve_issue(&snapshot, "Story", args).unwrap();
    assert_eq!(issue.epic.as_deref(), Some("KONG-10"));
    assert_eq!(issue.sprint, Some(43));
  }

  #[test]
  fn test_resolve_epic_under_initiative() {
    let snapshot = Snapshot {
      initiatives: vec![issue("KONG-50", "To Do", "Platform")],
      ..Default::default()
    };
    let args = EpicArgs {
      summary: "Offline mode".into(),
      initiative: Some(1),
      ..Default::default()
    };

    let epic = resolve_epic(&snapshot, &test_config(), args).unwrap();
    assert_eq!(epic.issue_type, "Epic");
    assert_eq!(epic.parent.as_deref(), Some("KONG-50"));
    assert_eq!(epic.epic_name.as_deref(), Some("Offline mode"));
    assert_eq!(epic.epic, None);
  }

  #[test]
  fn test_resolve_epic_rejects_unknown_initiative() {
    let args = EpicArgs {
      summary: "Offline mode".into(),
      initiative: Some(1),
      ..Default::default()
    };
    let err = resolve_epic(&Snapshot::default(), &test_config(), args).unwrap_err();
    assert_eq!(err.to_string(), "epic or initiative does not exist: 1");
  }

  #[test]
  fn test_resolve_epic_requires_parent_link_field() {
    let snapshot = Snapshot {
      initiatives: vec![issue("KONG-50", "To Do", "Platform")],
      ..Default::default()
    };
    let mut config = test_config();
    config.custom_fields.parent_link.clear();

    let standalone = EpicArgs {
      summary: "Offline mode".into(),
      ..Default::default()
    };
    assert!(resolve_epic(&snapshot, &config, standalone).is_ok());

    let nested = EpicArgs {
      summary: "Offline mode".into(),
      initiative: Some(1),
      ..Default::default()
    };
    let err = resolve_epic(&snapshot, &config, nested).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
  }

  #[test]
  fn test_parse_month_day() {
    assert_eq!(parse_month_day("04/01").unwrap(), (4, 1));
    assert_eq!(parse_month_day("12/31").unwrap(), (12, 31));
    assert!(parse_month_day("0401").is_err());
    assert!(parse_month_day("april/1").is_err());
  }
}
