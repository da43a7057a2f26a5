//! Serde-deserializable types matching GitHub REST API responses.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{Commit, PullRequest, RepoIssue};

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiPullRequest {
  pub created_at: DateTime<Utc>,
  pub merged_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Commits: the list endpoint has no stats, the detail endpoint does
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCommitRef {
  pub sha: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiCommitStats {
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommitDetail {
  pub author: Option<ApiUser>,
  #[serde(default)]
  pub stats: ApiCommitStats,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub created_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
  /// Present when the "issue" is really a pull request
  pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: String,
}

// ============================================================================
// Conversions to domain rows
// ============================================================================

const UNKNOWN_AUTHOR: &str = "Unknown";

fn login(user: Option<ApiUser>) -> String {
  user
    .map(|u| u.login)
    .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

impl From<ApiPullRequest> for PullRequest {
  fn from(pr: ApiPullRequest) -> Self {
    PullRequest {
      created_at: pr.created_at,
      merged_at: pr.merged_at,
    }
  }
}

impl From<ApiCommitDetail> for Commit {
  fn from(c: ApiCommitDetail) -> Self {
    Commit {
      author: login(c.author),
      total_changes: c.stats.total,
    }
  }
}

impl ApiIssue {
  pub fn is_pull_request(&self) -> bool {
    self.pull_request.is_some()
  }
}

impl From<ApiIssue> for RepoIssue {
  fn from(issue: ApiIssue) -> Self {
    RepoIssue {
      created_at: issue.created_at,
      closed_at: issue.closed_at,
    }
  }
}
