//! GitHub access for the source-control adapter.

mod api_types;
mod client;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::UpstreamError;

pub use client::GitHubClient;
pub use types::{Commit, PullRequest, RepoIssue};

/// Raw data retrieval from a source-control host.
#[async_trait]
pub trait SourceControlApi: Send + Sync {
  /// Pull requests created at or after `since`.
  async fn pull_requests(
    &self,
    repository: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<PullRequest>, UpstreamError>;

  /// Commits since `since`, with line statistics.
  async fn commits(&self, repository: &str, since: DateTime<Utc>)
    -> Result<Vec<Commit>, UpstreamError>;

  /// Issues created at or after `since`, pull requests excluded.
  async fn issues(&self, repository: &str, since: DateTime<Utc>)
    -> Result<Vec<RepoIssue>, UpstreamError>;
}
