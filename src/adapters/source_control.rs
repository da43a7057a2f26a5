use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{distribution, hours_between, mean, require_locator, window_start, AdapterKind, MetricSource};
use crate::error::{SyncError, SyncResult, EMPTY_REPOSITORY_MESSAGE};
use crate::github::{Commit, PullRequest, RepoIssue, SourceControlApi};
use crate::models::Metrics;

/// Rows fetched from the source-control host.
#[derive(Debug, Clone, Default)]
pub struct SourceControlRaw {
  pub pull_requests: Vec<PullRequest>,
  pub commits: Vec<Commit>,
  pub issues: Vec<RepoIssue>,
}

/// Pull request, commit and issue metrics for one repository.
pub struct SourceControlAdapter {
  api: Arc<dyn SourceControlApi>,
  repository: Option<String>,
}

impl SourceControlAdapter {
  pub fn new(api: Arc<dyn SourceControlApi>, repository: Option<String>) -> Self {
    Self { api, repository }
  }

  pub fn repository(&self) -> Option<&str> {
    self.repository.as_deref()
  }
}

#[async_trait]
impl MetricSource for SourceControlAdapter {
  type Raw = SourceControlRaw;

  async fn fetch_raw(&self, repository: &str, days: u32) -> SyncResult<SourceControlRaw> {
    require_locator(repository, AdapterKind::SourceControl.missing_locator_message())?;
    let since = window_start(Utc::now(), days)?;

    let (pull_requests, commits, issues) = tokio::try_join!(
      self.api.pull_requests(repository, since),
      self.api.commits(repository, since),
      self.api.issues(repository, since),
    )?;

    tracing::debug!(
      repository,
      pull_requests = pull_requests.len(),
      commits = commits.len(),
      issues = issues.len(),
      "fetched source-control activity"
    );

    Ok(SourceControlRaw {
      pull_requests,
      commits,
      issues,
    })
  }

  fn aggregate(
    &self,
    repository: &str,
    days: u32,
    raw: SourceControlRaw,
    _now: DateTime<Utc>,
  ) -> Metrics {
    let mut metrics = Metrics::new();

    if !raw.pull_requests.is_empty() {
      let merged: Vec<&PullRequest> = raw
        .pull_requests
        .iter()
        .filter(|pr| pr.merged_at.is_some())
        .collect();

      let merge_hours = merged
        .iter()
        .filter_map(|pr| pr.merged_at.map(|at| hours_between(pr.created_at, at)));
      if let Some(avg) = mean(merge_hours) {
        metrics.insert("avg_time_to_merge_hours", avg);
      }

      metrics.insert("pr_count", raw.pull_requests.len() as u64);
      metrics.insert(
        "pr_merge_rate",
        merged.len() as f64 / raw.pull_requests.len() as f64,
      );
    }

    if !raw.commits.is_empty() {
      metrics.insert("commit_count", raw.commits.len() as u64);
      if let Some(avg) = mean(raw.commits.iter().map(|c| c.total_changes as f64)) {
        metrics.insert("avg_commit_size", avg);
      }
      metrics.insert(
        "author_distribution",
        distribution(raw.commits.iter().map(|c| c.author.as_str())),
      );
    }

    if !raw.issues.is_empty() {
      let closed: Vec<&RepoIssue> = raw
        .issues
        .iter()
        .filter(|i| i.closed_at.is_some())
        .collect();

      let close_hours = closed
        .iter()
        .filter_map(|i| i.closed_at.map(|at| hours_between(i.created_at, at)));
      if let Some(avg) = mean(close_hours) {
        metrics.insert("avg_time_to_close_hours", avg);
      }

      metrics.insert("issue_count", raw.issues.len() as u64);
      metrics.insert(
        "issue_close_rate",
        closed.len() as f64 / raw.issues.len() as f64,
      );
    }

    if metrics.is_empty() {
      metrics.insert("no_activity", true);
      metrics.insert(
        "message",
        format!(
          "No activity found in the repository {} in the last {} days",
          repository, days
        ),
      );
      metrics.insert("status", "valid_but_inactive");
      metrics.insert("pr_count", 0u64);
      metrics.insert("commit_count", 0u64);
      metrics.insert("issue_count", 0u64);
    } else {
      metrics.insert("status", "active");
    }

    metrics
  }

  /// Upstream failures come back as an error-carrying result so a batch of
  /// integrations is never aborted by one repository.
  async fn compute_metrics(&self, repository: &str, days: u32) -> SyncResult<Metrics> {
    match self.fetch_raw(repository, days).await {
      Ok(raw) => Ok(self.aggregate(repository, days, raw, Utc::now())),
      Err(SyncError::Upstream(e)) => {
        tracing::warn!(repository, error = %e, "failed to calculate GitHub metrics");
        let message = match e {
          crate::error::UpstreamError::EmptyRepository { .. } => EMPTY_REPOSITORY_MESSAGE.to_string(),
          other => format!("Error calculating metrics: {}", other),
        };
        Ok(Metrics::failed(message))
      }
      Err(other) => Err(other),
    }
  }
}
