use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{distribution, require_locator, window_start, AdapterKind, MetricSource};
use crate::error::SyncResult;
use crate::jira::{IssueTrackerApi, Sprint, TrackerIssue};
use crate::models::Metrics;

/// Upper bound on issues pulled per computation.
const MAX_ISSUES: usize = 1000;
/// Statuses counted as finished work for story points.
const DONE_STATUSES: [&str; 3] = ["Done", "Closed", "Resolved"];

/// Outcome of the best-effort sprint lookup.
#[derive(Debug, Clone)]
pub enum SprintLookup {
  NoBoard,
  Found(Vec<Sprint>),
  Failed(String),
}

/// Rows fetched from the issue tracker.
#[derive(Debug, Clone)]
pub struct IssueTrackerRaw {
  pub issues: Vec<TrackerIssue>,
  pub sprints: SprintLookup,
}

/// Issue and sprint metrics for one project.
pub struct IssueTrackerAdapter {
  api: Arc<dyn IssueTrackerApi>,
  project_key: Option<String>,
}

impl IssueTrackerAdapter {
  pub fn new(api: Arc<dyn IssueTrackerApi>, project_key: Option<String>) -> Self {
    Self { api, project_key }
  }

  pub fn project_key(&self) -> Option<&str> {
    self.project_key.as_deref()
  }

  /// Sprint counts come from the project's first board. Any failure is kept
  /// as a message instead of failing the computation.
  async fn lookup_sprints(&self, project_key: &str) -> SprintLookup {
    let boards = match self.api.boards(project_key).await {
      Ok(boards) => boards,
      Err(e) => {
        tracing::debug!(project_key, error = %e, "board lookup failed");
        return SprintLookup::Failed(e.to_string());
      }
    };
    let Some(board) = boards.first() else {
      return SprintLookup::NoBoard;
    };
    match self.api.sprints(board.id).await {
      Ok(sprints) => SprintLookup::Found(sprints),
      Err(e) => {
        tracing::debug!(project_key, board_id = board.id, error = %e, "sprint lookup failed");
        SprintLookup::Failed(e.to_string())
      }
    }
  }
}

/// JQL selecting issues of `project_key` created on or after `since`.
pub fn issues_jql(project_key: &str, since: DateTime<Utc>) -> String {
  format!(
    "project = \"{}\" AND created >= {} ORDER BY created DESC",
    project_key.replace('"', ""),
    since.format("%Y-%m-%d")
  )
}

#[async_trait]
impl MetricSource for IssueTrackerAdapter {
  type Raw = IssueTrackerRaw;

  async fn fetch_raw(&self, project_key: &str, days: u32) -> SyncResult<IssueTrackerRaw> {
    require_locator(project_key, AdapterKind::IssueTracker.missing_locator_message())?;

    let jql = issues_jql(project_key, window_start(Utc::now(), days)?);
    let issues = self.api.search_issues(&jql, MAX_ISSUES).await?;
    let sprints = self.lookup_sprints(project_key).await;

    tracing::debug!(project_key, issues = issues.len(), "fetched issue-tracker activity");
    Ok(IssueTrackerRaw { issues, sprints })
  }

  fn aggregate(
    &self,
    _project_key: &str,
    _days: u32,
    raw: IssueTrackerRaw,
    _now: DateTime<Utc>,
  ) -> Metrics {
    let mut metrics = Metrics::new();
    let issues = &raw.issues;

    if !issues.is_empty() {
      metrics.insert(
        "issue_counts_by_type",
        distribution(issues.iter().map(|i| i.issue_type.as_str())),
      );

      let completed_points: Vec<f64> = issues
        .iter()
        .filter(|i| DONE_STATUSES.contains(&i.status.as_str()))
        .filter_map(|i| i.story_points)
        .collect();
      if !completed_points.is_empty() {
        metrics.insert("completed_story_points", completed_points.iter().sum::<f64>());
      }

      metrics.insert(
        "issue_counts_by_status",
        distribution(issues.iter().map(|i| i.status.as_str())),
      );

      if issues.iter().any(|i| i.assignee.is_some()) {
        metrics.insert(
          "assignee_distribution",
          distribution(issues.iter().filter_map(|i| i.assignee.as_deref())),
        );
      }
    }

    match raw.sprints {
      SprintLookup::Found(sprints) if !sprints.is_empty() => {
        let count = |state: &str| sprints.iter().filter(|s| s.state == state).count() as u64;
        metrics.insert("active_sprint_count", count("active"));
        metrics.insert("completed_sprint_count", count("closed"));
      }
      SprintLookup::Failed(message) => metrics.insert("sprint_error", message),
      SprintLookup::Found(_) | SprintLookup::NoBoard => {}
    }

    metrics
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::fakes::{sprint, tracker_issue, FakeJira};
  use crate::error::{SyncError, UpstreamError};
  use chrono::TimeZone;
  use serde_json::json;

  fn sample_issues() -> Vec<TrackerIssue> {
    vec![
      tracker_issue("Story", "Done", Some("Ada"), Some(5.0)),
      tracker_issue("Story", "Resolved", Some("Bob"), Some(3.0)),
      tracker_issue("Bug", "In Progress", Some("Ada"), Some(8.0)),
      tracker_issue("Bug", "Closed", None, None),
    ]
  }

  #[tokio::test]
  async fn test_issue_metrics() {
    let api = FakeJira {
      issues: sample_issues(),
      ..FakeJira::default()
    };
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let metrics = adapter.compute_metrics("OPS", 30).await.unwrap();

    assert_eq!(
      metrics.get("issue_counts_by_type"),
      Some(&json!({"Bug": 2, "Story": 2}))
    );
    assert_eq!(
      metrics.get("issue_counts_by_status"),
      Some(&json!({"Closed": 1, "Done": 1, "In Progress": 1, "Resolved": 1}))
    );
    assert_eq!(metrics.get("completed_story_points"), Some(&json!(8.0)));
    assert_eq!(
      metrics.get("assignee_distribution"),
      Some(&json!({"Ada": 2, "Bob": 1}))
    );
    // No board attached to the project
    assert!(!metrics.contains("active_sprint_count"));
    assert!(!metrics.contains("sprint_error"));
  }

  #[tokio::test]
  async fn test_sprint_counts_from_first_board() {
    let api = FakeJira {
      sprints: vec![sprint("closed"), sprint("closed"), sprint("active"), sprint("future")],
      ..FakeJira::default()
    }
    .with_board(10)
    .with_board(11);
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let metrics = adapter.compute_metrics("OPS", 30).await.unwrap();

    assert_eq!(metrics.get("active_sprint_count"), Some(&json!(1)));
    assert_eq!(metrics.get("completed_sprint_count"), Some(&json!(2)));
  }

  #[tokio::test]
  async fn test_sprint_failure_is_captured() {
    let api = FakeJira {
      issues: sample_issues(),
      sprint_failure: Some(UpstreamError::service("jira", "board is kanban")),
      ..FakeJira::default()
    }
    .with_board(10);
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let metrics = adapter.compute_metrics("OPS", 30).await.unwrap();

    assert_eq!(metrics.get("sprint_error"), Some(&json!("jira: board is kanban")));
    assert!(metrics.contains("issue_counts_by_type"));
  }

  #[tokio::test]
  async fn test_board_listing_failure_is_captured() {
    let api = FakeJira {
      issues: sample_issues(),
      board_failure: Some(UpstreamError::service("jira", "Failed to list boards: 502")),
      ..FakeJira::default()
    }
    .with_board(10);
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let metrics = adapter.compute_metrics("OPS", 30).await.unwrap();

    assert_eq!(
      metrics.get("sprint_error"),
      Some(&json!("jira: Failed to list boards: 502"))
    );
    assert!(!metrics.contains("active_sprint_count"));
  }

  #[tokio::test]
  async fn test_search_failure_raises() {
    let api = FakeJira {
      search_failure: Some(UpstreamError::Timeout {
        service: "jira",
        seconds: 30,
      }),
      ..FakeJira::default()
    };
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let err = adapter.compute_metrics("OPS", 30).await.unwrap_err();
    assert!(matches!(err, SyncError::Upstream(UpstreamError::Timeout { .. })));
  }

  #[tokio::test]
  async fn test_missing_project_key_raises_before_fetching() {
    let api = Arc::new(FakeJira::default());
    let adapter = IssueTrackerAdapter::new(api.clone(), None);
    let err = adapter.compute_metrics("  ", 30).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(api.calls(), 0);
  }

  #[tokio::test]
  async fn test_story_points_absent_when_nothing_completed_has_points() {
    let api = FakeJira {
      issues: vec![tracker_issue("Task", "Done", None, None)],
      ..FakeJira::default()
    };
    let adapter = IssueTrackerAdapter::new(Arc::new(api), None);
    let metrics = adapter.compute_metrics("OPS", 30).await.unwrap();
    assert!(!metrics.contains("completed_story_points"));
    assert!(!metrics.contains("assignee_distribution"));
  }

  #[test]
  fn test_jql_window() {
    let since = Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap();
    assert_eq!(
      issues_jql("OPS", since),
      "project = \"OPS\" AND created >= 2024-03-01 ORDER BY created DESC"
    );
  }
}
