use chrono::{DateTime, Utc};

/// Pull request row
#[derive(Debug, Clone)]
pub struct PullRequest {
  pub created_at: DateTime<Utc>,
  pub merged_at: Option<DateTime<Utc>>,
}

/// Commit row with its line statistics
#[derive(Debug, Clone)]
pub struct Commit {
  pub author: String,
  pub total_changes: u64,
}

/// Issue row (pull requests excluded)
#[derive(Debug, Clone)]
pub struct RepoIssue {
  pub created_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
}
