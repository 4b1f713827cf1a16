//! Concurrent refresh of every snapshot category.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use tracing::{debug, info};

use crate::error::Result;
use crate::jira::{Issue, JiraClient, Sprint};

use super::snapshot::Snapshot;

/// One independently loadable part of a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
  Issues,
  Epics,
  Initiatives,
  BoardId,
  SprintIssues,
  Sprints,
}

impl Category {
  pub const ALL: [Category; 6] = [
    Category::Issues,
    Category::Epics,
    Category::Initiatives,
    Category::BoardId,
    Category::SprintIssues,
    Category::Sprints,
  ];
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Category::Issues => "issues",
      Category::Epics => "epics",
      Category::Initiatives => "initiatives",
      Category::BoardId => "board id",
      Category::SprintIssues => "sprint issues",
      Category::Sprints => "sprints",
    };
    f.write_str(name)
  }
}

/// Result of a single category loader.
#[derive(Debug)]
pub enum Loaded {
  Issues(Vec<Issue>),
  Epics(Vec<Issue>),
  Initiatives(Vec<Issue>),
  BoardId(u64),
  SprintIssues(Vec<Issue>),
  /// `board_id` is set when the loader had to resolve the board itself.
  Sprints {
    sprints: Vec<Sprint>,
    board_id: Option<u64>,
  },
}

impl Loaded {
  /// Store the loaded value in its field of `snapshot`, rebuilding indices.
  pub fn apply(self, snapshot: &mut Snapshot) {
    match self {
      Loaded::Issues(issues) => snapshot.set_issues(issues),
      Loaded::Epics(epics) => snapshot.epics = epics,
      Loaded::Initiatives(initiatives) => snapshot.initiatives = initiatives,
      Loaded::BoardId(board_id) => snapshot.board_id = board_id,
      Loaded::SprintIssues(issues) => snapshot.sprint_issues = issues,
      Loaded::Sprints { sprints, board_id } => {
        if let Some(board_id) = board_id {
          snapshot.board_id = board_id;
        }
        snapshot.set_sprints(sprints);
      }
    }
  }
}

/// Runs the category loaders against a [`JiraClient`].
#[derive(Clone)]
pub struct Refresher {
  client: JiraClient,
}

impl Refresher {
  pub fn new(client: JiraClient) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &JiraClient {
    &self.client
  }

  /// Load a single category.
  ///
  /// `board_id` is the board already known to the caller; sprints resolve it
  /// first when it is 0.
  pub async fn load(&self, category: Category, board_id: u64) -> Result<Loaded> {
    let project = self.client.config().project.as_str();
    let loaded = match category {
      Category::Issues => Loaded::Issues(self.client.list_issues(project).await?),
      Category::Epics => Loaded::Epics(self.client.list_epics(project).await?),
      Category::Initiatives => Loaded::Initiatives(self.client.list_initiatives(project).await?),
      Category::BoardId => Loaded::BoardId(self.client.get_board_id(project).await?),
      Category::SprintIssues => Loaded::SprintIssues(self.client.list_sprint_issues().await?),
      Category::Sprints => {
        let resolved = if board_id == 0 {
          Some(self.client.get_board_id(project).await?)
        } else {
          None
        };
        let sprints = self
          .client
          .list_sprints(resolved.unwrap_or(board_id))
          .await?;
        Loaded::Sprints {
          sprints,
          board_id: resolved,
        }
      }
    };
    Ok(loaded)
  }

  /// Refresh every category of `snapshot` concurrently.
  ///
  /// Each loader that succeeds is applied as soon as it finishes, even when a
  /// sibling fails. The first failure in completion order is returned once
  /// all loaders are done. The timestamp only moves on full success.
  ///
  /// Dropping the returned future abandons the remaining loaders.
  pub async fn refresh(&self, snapshot: &mut Snapshot) -> Result<()> {
    let board_id = snapshot.board_id;
    let mut pending: FuturesUnordered<BoxFuture<'_, (Category, Result<Loaded>)>> = Category::ALL
      .iter()
      .map(|&category| {
        async move { (category, self.load(category, board_id).await) }.boxed()
      })
      .collect();

    let mut first_error = None;
    while let Some((category, result)) = pending.next().await {
      match result {
        Ok(loaded) => {
          debug!(%category, "loader finished");
          loaded.apply(snapshot);
        }
        Err(e) => {
          debug!(%category, error = %e, "loader failed");
          first_error.get_or_insert(e);
        }
      }
    }

    if let Some(e) = first_error {
      return Err(e);
    }

    snapshot.timestamp = Utc::now().timestamp();
    info!(
      issues = snapshot.issues.len(),
      epics = snapshot.epics.len(),
      sprints = snapshot.sprints.len(),
      "snapshot refreshed"
    );
    Ok(())
  }
}
