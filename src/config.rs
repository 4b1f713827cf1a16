use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the config file location.
const CONFIG_PATH_ENV: &str = "KONG_CONFIG";

/// Environment variable that supplies the Jira password or API token.
const TOKEN_ENV: &str = "KONG_JIRA_TOKEN";

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;
const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
  #[serde(default)]
  pub endpoint: String,
  #[serde(default)]
  pub username: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub password: String,

  #[serde(default)]
  pub project: String,
  /// Issue type used for newly created issues (e.g., "Story")
  #[serde(default)]
  pub issue_type: String,
  #[serde(default, deserialize_with = "deserialize_non_empty")]
  pub labels: Vec<String>,
  #[serde(default, deserialize_with = "deserialize_non_empty")]
  pub components: Vec<String>,
  #[serde(default)]
  pub custom_fields: CustomFieldsConfig,

  /// Only sprints whose name contains this keyword are listed
  #[serde(default)]
  pub sprint_keyword: String,
  /// Sprint length in days, used when creating sprints
  #[serde(default)]
  pub sprint_duration: u32,

  /// Daemon cadence in seconds. Snapshots older than twice this are stale.
  #[serde(default = "default_refresh_interval")]
  pub refresh_interval: u64,
  /// Page size for JQL searches
  #[serde(default = "default_page_size")]
  pub page_size: u32,
}

/// Names of the project-specific custom fields Jira uses for epic links,
/// sprint membership and story points (e.g., "customfield_10014").
///
/// `epicName` and `parentLink` are only needed to create epics under an
/// initiative; empty means the field is not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldsConfig {
  #[serde(default)]
  pub epics: String,
  #[serde(default)]
  pub sprints: String,
  #[serde(default)]
  pub story_points: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub epic_name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub parent_link: String,
}

fn default_refresh_interval() -> u64 {
  DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_page_size() -> u32 {
  DEFAULT_PAGE_SIZE
}

/// Comma-separated prompts leave empty entries behind; drop them on load.
fn deserialize_non_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect(),
  )
}

impl Config {
  /// Load and validate the configuration from its fixed location.
  ///
  /// Returns [`Error::ConfigMissing`] if no file exists yet.
  pub fn load() -> Result<Self> {
    let mut config = Self::read(&Self::path()?)?;
    if let Ok(token) = std::env::var(TOKEN_ENV) {
      config.password = token;
    }
    config.validate()?;
    Ok(config)
  }

  /// Read the configuration file without validating it.
  pub fn read(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(Error::ConfigMissing);
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
  }

  /// Write the configuration, creating the parent directory if needed.
  pub fn write(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(self)?)?;
    Ok(())
  }

  /// Location of the config file.
  ///
  /// `$KONG_CONFIG` if set, otherwise `$XDG_CONFIG_HOME/kong/config.yaml`.
  pub fn path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
      return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
      .ok_or_else(|| Error::InvalidConfig("could not determine config directory".into()))?;
    Ok(config_dir.join("kong").join("config.yaml"))
  }

  pub fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_interval.max(1))
  }

  /// Custom field names are resolved once here instead of at request time.
  pub fn validate(&self) -> Result<()> {
    let required = [
      ("endpoint", &self.endpoint),
      ("username", &self.username),
      ("project", &self.project),
      ("customFields.epics", &self.custom_fields.epics),
      ("customFields.sprints", &self.custom_fields.sprints),
      ("customFields.storyPoints", &self.custom_fields.story_points),
    ];
    if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
      return Err(Error::InvalidConfig(format!("{} is not set", name)));
    }
    if self.page_size == 0 {
      return Err(Error::InvalidConfig("pageSize must be positive".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
  Config {
    endpoint: "https://jira.example.com".into(),
    username: "king".into(),
    password: "banana".into(),
    project: "KONG".into(),
    issue_type: "Story".into(),
    labels: Vec::new(),
    components: Vec::new(),
    custom_fields: CustomFieldsConfig {
      epics: "customfield_10014".into(),
      sprints: "customfield_10020".into(),
      story_points: "customfield_10016".into(),
      epic_name: "customfield_10011".into(),
      parent_link: "customfield_10018".into(),
    },
    sprint_keyword: "Kong".into(),
    sprint_duration: 14,
    refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
    page_size: DEFAULT_PAGE_SIZE,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_read_missing_file_is_config_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::read(&dir.path().join("config.yaml")).unwrap_err();
    assert!(err.is_config_missing());
  }

  #[test]
  fn test_write_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.yaml");
    let config = test_config();

    config.write(&path).unwrap();
    assert_eq!(Config::read(&path).unwrap(), config);
  }

  #[test]
  fn test_parse_camel_case_with_defaults() {
    let yaml = r#"
endpoint: https://jira.example.com
username: king
project: KONG
issueType: Story
labels: ["", "backend"]
customFields:
  epics: customfield_10014
  sprints: customfield_10020
  storyPoints: customfield_10016
sprintKeyword: Kong
sprintDuration: 14
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.labels, vec!["backend".to_string()]);
    assert_eq!(config.custom_fields.story_points, "customfield_10016");
    assert!(config.custom_fields.parent_link.is_empty());
    assert_eq!(config.refresh_interval, 10);
    assert_eq!(config.page_size, 100);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_validate_requires_custom_fields() {
    let mut config = test_config();
    config.custom_fields.sprints.clear();
    let err = config.validate().unwrap_err();
    assert_eq!(
      err.to_string(),
      "invalid configuration: customFields.sprints is not set"
    );
  }
}
