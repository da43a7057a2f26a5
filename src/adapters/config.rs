//! Typed adapter creation configs parsed from the free-form config map.
//!
//! Credentials missing from the map fall back to the usual environment
//! variables of each service.

use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Default custom field holding story points on Jira Cloud.
pub const DEFAULT_STORY_POINTS_FIELD: &str = "customfield_10002";

fn lookup(config: &Map<String, Value>, key: &str, env: &[&str]) -> Option<String> {
  let from_map = config.get(key).and_then(|v| match v {
    Value::String(s) => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  });
  from_map
    .filter(|s| !s.is_empty())
    .or_else(|| {
      env
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|s| !s.trim().is_empty())
    })
}

fn required(
  config: &Map<String, Value>,
  key: &str,
  env: &[&str],
  service: &str,
) -> SyncResult<String> {
  lookup(config, key, env).ok_or_else(|| {
    SyncError::config(format!("{} integration is missing '{}'", service, key))
  })
}

/// `{api_token, repository}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceControlConfig {
  pub api_token: Option<String>,
  pub repository: Option<String>,
  pub api_url: Option<String>,
}

impl SourceControlConfig {
  pub fn from_map(config: &Map<String, Value>) -> SyncResult<Self> {
    Ok(Self {
      api_token: lookup(config, "api_token", &["GITHUB_TOKEN"]),
      repository: lookup(config, "repository", &[]),
      api_url: lookup(config, "api_url", &[]),
    })
  }
}

/// `{server, username, api_token}` plus an optional stored project key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTrackerConfig {
  pub server: String,
  pub username: String,
  pub api_token: String,
  pub project_key: Option<String>,
  pub story_points_field: String,
}

impl IssueTrackerConfig {
  pub fn from_map(config: &Map<String, Value>) -> SyncResult<Self> {
    Ok(Self {
      server: required(config, "server", &["JIRA_SERVER"], "Jira")?,
      username: required(config, "username", &["JIRA_USERNAME"], "Jira")?,
      api_token: required(config, "api_token", &["JIRA_API_TOKEN"], "Jira")?,
      project_key: lookup(config, "project_key", &[]),
      story_points_field: lookup(config, "story_points_field", &[])
        .unwrap_or_else(|| DEFAULT_STORY_POINTS_FIELD.to_string()),
    })
  }
}

/// `{api_key, token}` plus an optional stored board id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
  pub api_key: String,
  pub token: String,
  pub board_id: Option<String>,
  pub api_url: Option<String>,
}

impl BoardConfig {
  pub fn from_map(config: &Map<String, Value>) -> SyncResult<Self> {
    Ok(Self {
      api_key: required(config, "api_key", &["TRELLO_API_KEY"], "Trello")?,
      token: required(config, "token", &["TRELLO_TOKEN"], "Trello")?,
      board_id: lookup(config, "board_id", &[]),
      api_url: lookup(config, "api_url", &[]),
    })
  }
}
