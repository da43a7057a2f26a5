//! Integration registry: maps type tags to adapters and validates requests.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::adapters::{
  Adapter, AdapterKind, AdapterSource, BoardAdapter, BoardConfig, IssueTrackerAdapter,
  IssueTrackerConfig, SourceControlAdapter, SourceControlConfig,
};
use crate::cache::{Memoized, Memoizer};
use crate::error::{SyncError, SyncResult};
use crate::github::{GitHubClient, SourceControlApi};
use crate::jira::{IssueTrackerApi, JiraClient};
use crate::models::{MetricParams, Metrics};
use crate::trello::{BoardApi, TrelloClient};

/// Produces upstream API handles from adapter configs.
pub trait Connector: Send + Sync {
  fn source_control(&self, config: &SourceControlConfig) -> SyncResult<Arc<dyn SourceControlApi>>;
  fn issue_tracker(&self, config: &IssueTrackerConfig) -> SyncResult<Arc<dyn IssueTrackerApi>>;
  fn board(&self, config: &BoardConfig) -> SyncResult<Arc<dyn BoardApi>>;
}

/// Connector talking to the real services over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnector {
  timeout: Duration,
}

impl HttpConnector {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }
}

impl Connector for HttpConnector {
  fn source_control(&self, config: &SourceControlConfig) -> SyncResult<Arc<dyn SourceControlApi>> {
    let client = GitHubClient::new(
      config.api_token.clone(),
      config.api_url.as_deref(),
      self.timeout,
    )?;
    Ok(Arc::new(client))
  }

  fn issue_tracker(&self, config: &IssueTrackerConfig) -> SyncResult<Arc<dyn IssueTrackerApi>> {
    let client = JiraClient::new(
      &config.server,
      &config.username,
      &config.api_token,
      &config.story_points_field,
      self.timeout,
    )?;
    Ok(Arc::new(client))
  }

  fn board(&self, config: &BoardConfig) -> SyncResult<Arc<dyn BoardApi>> {
    let client = TrelloClient::new(
      &config.api_key,
      &config.token,
      config.api_url.as_deref(),
      self.timeout,
    )?;
    Ok(Arc::new(client))
  }
}

/// Builds adapters for integrations and routes metric requests to them.
#[derive(Clone)]
pub struct Registry {
  connector: Arc<dyn Connector>,
  memo: Memoizer,
}

impl Registry {
  pub fn new(connector: Arc<dyn Connector>, memo: Memoizer) -> Self {
    Self { connector, memo }
  }

  /// Type tags accepted by [`Registry::create_adapter`].
  pub fn supported_types() -> Vec<&'static str> {
    AdapterKind::ALL.iter().map(AdapterKind::tag).collect()
  }

  /// Build an adapter of type `tag` from its creation config.
  pub fn create_adapter(&self, tag: &str, config: &Map<String, Value>) -> SyncResult<Adapter> {
    let (source, host) = match AdapterKind::parse(tag)? {
      AdapterKind::SourceControl => {
        let cfg = SourceControlConfig::from_map(config)?;
        let api = self.connector.source_control(&cfg)?;
        let host = cfg.api_url.as_deref().and_then(upstream_host);
        (
          AdapterSource::SourceControl(SourceControlAdapter::new(api, cfg.repository)),
          host,
        )
      }
      AdapterKind::IssueTracker => {
        let cfg = IssueTrackerConfig::from_map(config)?;
        let api = self.connector.issue_tracker(&cfg)?;
        let host = upstream_host(&cfg.server);
        (
          AdapterSource::IssueTracker(IssueTrackerAdapter::new(api, cfg.project_key)),
          host,
        )
      }
      AdapterKind::Board => {
        let cfg = BoardConfig::from_map(config)?;
        let api = self.connector.board(&cfg)?;
        let host = cfg.api_url.as_deref().and_then(upstream_host);
        (AdapterSource::Board(BoardAdapter::new(api, cfg.board_id)), host)
      }
    };
    Ok(Adapter::new(source, self.memo.clone()).with_host(host))
  }

  /// Compute metrics with `adapter`, validating request parameters first.
  pub async fn compute_metrics(
    &self,
    adapter: &Adapter,
    params: &MetricParams,
  ) -> SyncResult<Memoized<Metrics>> {
    let locator = resolve_locator(adapter, params)?;
    adapter.compute_metrics(&locator, params.days).await
  }

  /// Metric names and descriptions an adapter type can produce.
  pub fn supported_metrics(tag: &str) -> SyncResult<BTreeMap<&'static str, &'static str>> {
    let metrics: &[(&str, &str)] = match AdapterKind::parse(tag)? {
      AdapterKind::SourceControl => &[
        ("pr_count", "Number of pull requests in the period"),
        ("pr_merge_rate", "Share of pull requests that were merged"),
        ("avg_time_to_merge_hours", "Average time to merge pull requests (hours)"),
        ("commit_count", "Number of commits in the period"),
        ("avg_commit_size", "Average size of commits (lines changed)"),
        ("author_distribution", "Distribution of commits by author"),
        ("issue_count", "Number of issues in the period"),
        ("issue_close_rate", "Share of issues that were closed"),
        ("avg_time_to_close_hours", "Average time to close issues (hours)"),
      ],
      AdapterKind::IssueTracker => &[
        ("issue_counts_by_type", "Number of issues by type"),
        ("issue_counts_by_status", "Number of issues by status"),
        ("completed_story_points", "Total story points completed"),
        ("assignee_distribution", "Distribution of issues by assignee"),
        ("active_sprint_count", "Number of active sprints"),
        ("completed_sprint_count", "Number of completed sprints"),
      ],
      AdapterKind::Board => &[
        ("card_counts_by_list", "Number of cards in each list"),
        ("closed_card_count", "Number of closed cards"),
        ("open_card_count", "Number of open cards"),
        ("cards_with_due_count", "Number of cards with due dates"),
        ("overdue_card_count", "Number of overdue cards"),
        ("avg_checklist_completion", "Average checklist completion ratio"),
        ("label_distribution", "Distribution of cards by label"),
        ("member_distribution", "Distribution of cards by member"),
      ],
    };
    Ok(metrics.iter().copied().collect())
  }
}

/// The locator a request targets: request parameters first, then the
/// adapter's stored config. The repository is only ever taken from config.
fn resolve_locator(adapter: &Adapter, params: &MetricParams) -> SyncResult<String> {
  let kind = adapter.kind();
  let requested = match kind {
    AdapterKind::SourceControl => None,
    AdapterKind::IssueTracker => params.project_key.as_deref(),
    AdapterKind::Board => params.board_id.as_deref(),
  };
  requested
    .filter(|s| !s.trim().is_empty())
    .or_else(|| adapter.stored_locator())
    .filter(|s| !s.trim().is_empty())
    .map(String::from)
    .ok_or_else(|| SyncError::config(kind.missing_locator_message()))
}

/// Host (and port) of an upstream base URL, used to scope cache keys.
fn upstream_host(raw: &str) -> Option<String> {
  match Url::parse(raw.trim()) {
    Ok(url) => url.host_str().map(|host| match url.port() {
      Some(port) => format!("{}:{}", host, port),
      None => host.to_string(),
    }),
    // Bare hosts such as "acme.atlassian.net" have no scheme
    Err(_) => Some(raw.trim().trim_end_matches('/').to_ascii_lowercase()).filter(|s| !s.is_empty()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::fakes::{tracker_issue, FakeConnector, FakeJira};
  use crate::cache::{CacheSource, MemoryStore};
  use serde_json::json;

  fn registry(connector: FakeConnector) -> Registry {
    Registry::new(Arc::new(connector), Memoizer::new(Arc::new(MemoryStore::new())))
  }

  fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
  }

  fn jira_config() -> Map<String, Value> {
    map(json!({
      "server": "https://acme.atlassian.net",
      "username": "bot@acme.io",
      "api_token": "t"
    }))
  }

  #[test]
  fn test_unsupported_type() {
    let err = registry(FakeConnector::default())
      .create_adapter("gitlab", &Map::new())
      .err()
      .unwrap();
    assert!(matches!(err, SyncError::UnsupportedType(_)));
    assert_eq!(err.to_string(), "Unsupported integration type: gitlab");
  }

  #[test]
  fn test_tag_dispatch() {
    let registry = registry(FakeConnector::default());
    let adapter = registry
      .create_adapter("GitHub", &map(json!({"repository": "acme/app"})))
      .unwrap();
    assert_eq!(adapter.kind(), AdapterKind::SourceControl);
    assert_eq!(adapter.stored_locator(), Some("acme/app"));

    let adapter = registry.create_adapter("jira", &jira_config()).unwrap();
    assert_eq!(adapter.kind(), AdapterKind::IssueTracker);
  }

  #[tokio::test]
  async fn test_missing_project_key_fails_before_delegating() {
    let connector = FakeConnector::default();
    let jira = connector.jira.clone();
    let registry = registry(connector);
    let adapter = registry.create_adapter("jira", &jira_config()).unwrap();

    let err = registry
      .compute_metrics(&adapter, &MetricParams::default())
      .await
      .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "project_key is required for Jira metrics");
    assert_eq!(jira.calls(), 0);
  }

  #[tokio::test]
  async fn test_requested_locator_overrides_stored() {
    let connector = FakeConnector::default();
    let jira = connector.jira.clone();
    let registry = registry(connector);

    let mut config = jira_config();
    config.insert("project_key".to_string(), json!("OPS"));
    let adapter = registry.create_adapter("jira", &config).unwrap();

    let params = MetricParams {
      project_key: Some("WEB".to_string()),
      ..MetricParams::default()
    };
    registry.compute_metrics(&adapter, &params).await.unwrap();

    let jql = jira.last_jql.lock().unwrap().clone().unwrap();
    assert!(jql.starts_with("project = \"WEB\""));
  }

  #[tokio::test]
  async fn test_repeated_request_is_served_from_cache() {
    let connector = FakeConnector::default();
    let jira = connector.jira.clone();
    let registry = registry(connector);
    let adapter = registry.create_adapter("jira", &jira_config()).unwrap();
    let params = MetricParams {
      project_key: Some("OPS".to_string()),
      ..MetricParams::default()
    };

    let first = registry.compute_metrics(&adapter, &params).await.unwrap();
    let calls = jira.calls();
    let second = registry.compute_metrics(&adapter, &params).await.unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(first.value, second.value);
    assert_eq!(jira.calls(), calls);
  }

  #[tokio::test]
  async fn test_board_id_from_request() {
    let registry = registry(FakeConnector::default());
    let adapter = registry
      .create_adapter("trello", &map(json!({"api_key": "k", "token": "t"})))
      .unwrap();

    let err = registry
      .compute_metrics(&adapter, &MetricParams::default())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "board_id is required for Trello metrics");

    let params = MetricParams {
      board_id: Some("b1".to_string()),
      ..MetricParams::default()
    };
    assert!(registry.compute_metrics(&adapter, &params).await.is_ok());
  }

  #[tokio::test]
  async fn test_cache_is_scoped_per_upstream_host() {
    let connector = FakeConnector::default();
    let jira = connector.jira.clone();
    let registry = registry(connector);
    let params = MetricParams {
      project_key: Some("OPS".to_string()),
      ..MetricParams::default()
    };

    let mut other_server = jira_config();
    other_server.insert("server".to_string(), json!("https://jira.internal.example:8443/"));
    let acme = registry.create_adapter("jira", &jira_config()).unwrap();
    let internal = registry.create_adapter("jira", &other_server).unwrap();

    registry.compute_metrics(&acme, &params).await.unwrap();
    let after_first = jira.calls();
    let second = registry.compute_metrics(&internal, &params).await.unwrap();
    assert_eq!(second.source, CacheSource::Network);
    assert!(jira.calls() > after_first);

    let again = registry.create_adapter("jira", &jira_config()).unwrap();
    let third = registry.compute_metrics(&again, &params).await.unwrap();
    assert_eq!(third.source, CacheSource::Cache);
  }

  #[test]
  fn test_upstream_host() {
    assert_eq!(
      upstream_host("https://acme.atlassian.net/").as_deref(),
      Some("acme.atlassian.net")
    );
    assert_eq!(
      upstream_host("https://ghe.acme.io:8443/api/v3").as_deref(),
      Some("ghe.acme.io:8443")
    );
    assert_eq!(upstream_host("Jira.Acme.IO").as_deref(), Some("jira.acme.io"));
    assert_eq!(upstream_host("  "), None);
  }

  #[test]
  fn test_supported_metrics() {
    let github = Registry::supported_metrics("github").unwrap();
    assert!(github.contains_key("pr_merge_rate"));
    assert_eq!(github.len(), 9);

    let jira = Registry::supported_metrics("JIRA").unwrap();
    assert!(jira.contains_key("completed_story_points"));

    assert!(Registry::supported_metrics("gitlab").is_err());
    assert_eq!(Registry::supported_types(), vec!["github", "jira", "trello"]);
  }

  #[tokio::test]
  async fn test_issue_data_flows_through() {
    let registry = registry(FakeConnector::with_jira(FakeJira {
      issues: vec![tracker_issue("Bug", "Done", None, Some(2.0))],
      ..FakeJira::default()
    }));
    let adapter = registry.create_adapter("jira", &jira_config()).unwrap();
    let params = MetricParams {
      project_key: Some("OPS".to_string()),
      ..MetricParams::default()
    };
    let metrics = registry.compute_metrics(&adapter, &params).await.unwrap().value;
    assert_eq!(metrics.get("completed_story_points"), Some(&json!(2.0)));
  }
}
