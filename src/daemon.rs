//! Background process that keeps the snapshot fresh.

use std::time::Duration;
use tracing::{error, info};

use crate::cache::{Refresher, Snapshot, SnapshotRepository};
use crate::error::Result;
use crate::jira::JiraClient;

/// Refreshes the snapshot on a fixed cadence and persists it, forever.
pub struct Daemon<S: SnapshotRepository> {
  refresher: Refresher,
  store: S,
  interval: Duration,
  snapshot: Snapshot,
}

impl<S: SnapshotRepository> Daemon<S> {
  pub fn new(client: JiraClient, store: S) -> Self {
    let interval = client.config().refresh_interval();
    Self {
      refresher: Refresher::new(client),
      store,
      interval,
      snapshot: Snapshot::default(),
    }
  }

  /// Run one refresh and write whatever it produced.
  ///
  /// The snapshot is written even when the refresh fails; the refresh error
  /// is returned afterwards. The last created issue recorded by interactive
  /// commands is merged in under the same store lock as the write.
  pub async fn tick(&mut self) -> Result<()> {
    let refreshed = self.refresher.refresh(&mut self.snapshot).await;

    let fresh = &self.snapshot;
    let mut created = None;
    self.store.update(&mut |persisted| {
      persisted.adopt(fresh);
      created = persisted.last_issue_created.clone();
    })?;
    self.snapshot.last_issue_created = created;

    refreshed
  }

  /// Loop until the process is killed. Failures are logged and retried at the
  /// same cadence.
  pub async fn run(mut self) {
    info!(interval = ?self.interval, "daemon started");
    loop {
      if let Err(e) = self.tick().await {
        error!(error = %e, "refresh failed");
      }
      tokio::time::sleep(self.interval).await;
    }
  }
}
