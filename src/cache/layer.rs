//! Foreground read path: serve the persisted snapshot while it is fresh and
//! fall back to the network when it is not.

use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::jira::{Issue, JiraClient, Sprint};

use super::refresh::{Category, Refresher};
use super::snapshot::Snapshot;
use super::storage::SnapshotRepository;

/// Cache layer used by interactive commands.
///
/// Stale reads fetch only the category asked for and leave the store alone;
/// a full refresh happens in [`CacheLayer::load_blocking`] or in the daemon.
pub struct CacheLayer<S: SnapshotRepository> {
  refresher: Refresher,
  store: S,
  snapshot: Snapshot,
  refresh_interval: Duration,
}

impl<S: SnapshotRepository> CacheLayer<S> {
  /// Create a cache layer over whatever `store` currently holds.
  pub fn open(client: JiraClient, store: S) -> Result<Self> {
    let refresh_interval = client.config().refresh_interval();
    let snapshot = store.load()?;
    Ok(Self {
      refresher: Refresher::new(client),
      store,
      snapshot,
      refresh_interval,
    })
  }

  pub fn client(&self) -> &JiraClient {
    self.refresher.client()
  }

  pub fn snapshot(&self) -> &Snapshot {
    &self.snapshot
  }

  pub fn is_stale(&self) -> bool {
    self
      .snapshot
      .is_stale(Utc::now().timestamp(), self.refresh_interval)
  }

  async fn ensure(&mut self, category: Category) -> Result<()> {
    if !self.is_stale() {
      return Ok(());
    }
    debug!(%category, "snapshot stale, fetching");
    let loaded = self
      .refresher
      .load(category, self.snapshot.board_id)
      .await?;
    loaded.apply(&mut self.snapshot);
    Ok(())
  }

  pub async fn get_issues(&mut self) -> Result<&[Issue]> {
    self.ensure(Category::Issues).await?;
    Ok(&self.snapshot.issues)
  }

  pub async fn get_epics(&mut self) -> Result<&[Issue]> {
    self.ensure(Category::Epics).await?;
    Ok(&self.snapshot.epics)
  }

  pub async fn get_initiatives(&mut self) -> Result<&[Issue]> {
    self.ensure(Category::Initiatives).await?;
    Ok(&self.snapshot.initiatives)
  }

  pub async fn get_sprint_issues(&mut self) -> Result<&[Issue]> {
    self.ensure(Category::SprintIssues).await?;
    Ok(&self.snapshot.sprint_issues)
  }

  pub async fn get_sprints(&mut self) -> Result<&[Sprint]> {
    self.ensure(Category::Sprints).await?;
    Ok(&self.snapshot.sprints)
  }

  /// Refresh the whole snapshot synchronously and persist it.
  ///
  /// Nothing is written if any category fails. Dropping the future before it
  /// completes leaves the store untouched.
  pub async fn load_blocking(&mut self) -> Result<&Snapshot> {
    self.refresher.refresh(&mut self.snapshot).await?;

    let fresh = &self.snapshot;
    let mut created = None;
    self.store.update(&mut |persisted| {
      persisted.adopt(fresh);
      created = persisted.last_issue_created.clone();
    })?;
    self.snapshot.last_issue_created = created;
    Ok(&self.snapshot)
  }

  /// Remember the most recently created issue and persist it.
  ///
  /// Only `last_issue_created` is touched in the store, so a concurrent daemon
  /// write is not rolled back.
  pub fn record_created(&mut self, key: String) -> Result<()> {
    self
      .store
      .update(&mut |persisted| persisted.last_issue_created = Some(key.clone()))?;
    self.snapshot.last_issue_created = Some(key);
    Ok(())
  }
}
