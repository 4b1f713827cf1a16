//! Error types shared by the cache core and the Jira client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to Jira or managing the local snapshot.
#[derive(Debug, Error)]
pub enum Error {
  /// No configuration file exists yet. Recoverable by running `kong configure`.
  #[error("configuration missing")]
  ConfigMissing,

  /// The configuration file exists but cannot be used.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// Jira answered with a non-success status. The body is kept verbatim.
  #[error("{body}")]
  Remote {
    status: u16,
    body: String,
  },

  /// The request never produced a response.
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("YAML error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("snapshot encoding error: {0}")]
  Encode(#[from] bincode::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// Input references something the current snapshot does not contain
  /// (an epic or sprint index, an issue key, a transition acronym).
  #[error("{0}")]
  DomainMismatch(String),

  /// The snapshot file lock could not be acquired or released.
  #[error("snapshot lock on {path}: {source}")]
  Lock {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

impl Error {
  /// Build a remote error from a status code and the raw response body.
  pub fn remote(status: u16, body: impl Into<String>) -> Self {
    Error::Remote {
      status,
      body: body.into(),
    }
  }

  pub fn is_config_missing(&self) -> bool {
    matches!(self, Error::ConfigMissing)
  }
}
