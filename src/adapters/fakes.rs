//! In-memory upstream APIs for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{BoardConfig, IssueTrackerConfig, SourceControlConfig};
use crate::error::{SyncResult, UpstreamError};
use crate::github::{Commit, PullRequest, RepoIssue, SourceControlApi};
use crate::jira::{Board, IssueTrackerApi, Sprint, TrackerIssue};
use crate::registry::Connector;
use crate::trello::{BoardApi, BoardList, Card};

pub fn pr(created_at: DateTime<Utc>, merged_at: Option<DateTime<Utc>>) -> PullRequest {
  PullRequest {
    created_at,
    merged_at,
  }
}

pub fn commit(author: &str, total_changes: u64) -> Commit {
  Commit {
    author: author.to_string(),
    total_changes,
  }
}

pub fn issue(created_at: DateTime<Utc>, closed_at: Option<DateTime<Utc>>) -> RepoIssue {
  RepoIssue {
    created_at,
    closed_at,
  }
}

#[derive(Default)]
pub struct FakeGitHub {
  pub pull_requests: Vec<PullRequest>,
  pub commits: Vec<Commit>,
  pub issues: Vec<RepoIssue>,
  pub failure: Option<UpstreamError>,
  pub calls: AtomicUsize,
}

impl FakeGitHub {
  pub fn failing(error: UpstreamError) -> Self {
    Self {
      failure: Some(error),
      ..Self::default()
    }
  }

  /// Number of upstream requests served.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn serve<T: Clone>(&self, rows: &[T]) -> Result<Vec<T>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match &self.failure {
      Some(e) => Err(e.clone()),
      None => Ok(rows.to_vec()),
    }
  }
}

#[async_trait]
impl SourceControlApi for FakeGitHub {
  async fn pull_requests(&self, _repo: &str, _since: DateTime<Utc>) -> Result<Vec<PullRequest>, UpstreamError> {
    self.serve(&self.pull_requests)
  }

  async fn commits(&self, _repo: &str, _since: DateTime<Utc>) -> Result<Vec<Commit>, UpstreamError> {
    self.serve(&self.commits)
  }

  async fn issues(&self, _repo: &str, _since: DateTime<Utc>) -> Result<Vec<RepoIssue>, UpstreamError> {
    self.serve(&self.issues)
  }
}

pub fn tracker_issue(
  issue_type: &str,
  status: &str,
  assignee: Option<&str>,
  story_points: Option<f64>,
) -> TrackerIssue {
  TrackerIssue {
    status: status.to_string(),
    issue_type: issue_type.to_string(),
    assignee: assignee.map(String::from),
    story_points,
  }
}

pub fn sprint(state: &str) -> Sprint {
  Sprint {
    state: state.to_string(),
  }
}

#[derive(Default)]
pub struct FakeJira {
  pub issues: Vec<TrackerIssue>,
  pub boards: Vec<Board>,
  pub sprints: Vec<Sprint>,
  pub search_failure: Option<UpstreamError>,
  pub board_failure: Option<UpstreamError>,
  pub sprint_failure: Option<UpstreamError>,
  pub last_jql: std::sync::Mutex<Option<String>>,
  pub calls: AtomicUsize,
}

impl FakeJira {
  pub fn with_board(mut self, id: u64) -> Self {
    self.boards.push(Board { id });
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl IssueTrackerApi for FakeJira {
  async fn search_issues(&self, jql: &str, max_results: usize) -> Result<Vec<TrackerIssue>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut last) = self.last_jql.lock() {
      *last = Some(jql.to_string());
    }
    match &self.search_failure {
      Some(e) => Err(e.clone()),
      None => Ok(self.issues.iter().take(max_results).cloned().collect()),
    }
  }

  async fn boards(&self, _project_key: &str) -> Result<Vec<Board>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match &self.board_failure {
      Some(e) => Err(e.clone()),
      None => Ok(self.boards.clone()),
    }
  }

  async fn sprints(&self, _board_id: u64) -> Result<Vec<Sprint>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match &self.sprint_failure {
      Some(e) => Err(e.clone()),
      None => Ok(self.sprints.clone()),
    }
  }
}

pub fn list(id: &str, name: &str) -> BoardList {
  BoardList {
    id: id.to_string(),
    name: name.to_string(),
  }
}

pub fn card(list_id: &str) -> Card {
  Card {
    list_id: list_id.to_string(),
    closed: false,
    due: None,
    labels: Vec::new(),
    members: Vec::new(),
    checklist: Default::default(),
    last_activity: Some(Utc::now()),
  }
}

#[derive(Default)]
pub struct FakeTrello {
  pub lists: Vec<BoardList>,
  pub cards: Vec<Card>,
  pub failure: Option<UpstreamError>,
  /// Panic on every request
  pub explode: bool,
  pub calls: AtomicUsize,
}

impl FakeTrello {
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl BoardApi for FakeTrello {
  async fn lists(&self, board_id: &str) -> Result<Vec<BoardList>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.explode {
      panic!("board {} exploded", board_id);
    }
    match &self.failure {
      Some(e) => Err(e.clone()),
      None => Ok(self.lists.clone()),
    }
  }

  async fn cards(&self, _board_id: &str) -> Result<Vec<Card>, UpstreamError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match &self.failure {
      Some(e) => Err(e.clone()),
      None => Ok(self.cards.clone()),
    }
  }
}

/// Connector handing out shared fakes, so tests can inspect call counts.
#[derive(Clone, Default)]
pub struct FakeConnector {
  pub github: Arc<FakeGitHub>,
  pub jira: Arc<FakeJira>,
  pub trello: Arc<FakeTrello>,
}

impl FakeConnector {
  pub fn with_github(github: FakeGitHub) -> Self {
    Self {
      github: Arc::new(github),
      ..Self::default()
    }
  }

  pub fn with_jira(jira: FakeJira) -> Self {
    Self {
      jira: Arc::new(jira),
      ..Self::default()
    }
  }

  pub fn with_trello(trello: FakeTrello) -> Self {
    Self {
      trello: Arc::new(trello),
      ..Self::default()
    }
  }
}

impl Connector for FakeConnector {
  fn source_control(&self, _config: &SourceControlConfig) -> SyncResult<Arc<dyn SourceControlApi>> {
    Ok(self.github.clone())
  }

  fn issue_tracker(&self, _config: &IssueTrackerConfig) -> SyncResult<Arc<dyn IssueTrackerApi>> {
    Ok(self.jira.clone())
  }

  fn board(&self, _config: &BoardConfig) -> SyncResult<Arc<dyn BoardApi>> {
    Ok(self.trello.clone())
  }
}
