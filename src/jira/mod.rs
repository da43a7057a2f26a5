//! Jira access for the issue-tracker adapter.

mod api_types;
mod client;
mod types;

use async_trait::async_trait;

use crate::error::UpstreamError;

pub use client::JiraClient;
pub use types::{Board, Sprint, TrackerIssue};

/// Raw data retrieval from an issue tracker.
#[async_trait]
pub trait IssueTrackerApi: Send + Sync {
  /// Run a JQL search, returning at most `max_results` issues.
  async fn search_issues(&self, jql: &str, max_results: usize)
    -> Result<Vec<TrackerIssue>, UpstreamError>;

  /// Boards attached to a project.
  async fn boards(&self, project_key: &str) -> Result<Vec<Board>, UpstreamError>;

  /// All sprints of a board.
  async fn sprints(&self, board_id: u64) -> Result<Vec<Sprint>, UpstreamError>;
}
