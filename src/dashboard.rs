//! Dashboard views: metrics for every integration of a project or team.

use futures::future::join_all;
use serde::Serialize;

use crate::db::OwnerRef;
use crate::error::SyncResult;
use crate::models::{MetricParams, MetricsEnvelope};
use crate::service::MetricsService;

/// Per-integration envelopes of one owner.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
  pub days: u32,
  pub integrations: Vec<MetricsEnvelope>,
}

impl DashboardView {
  pub fn failed_count(&self) -> usize {
    self.integrations.iter().filter(|e| e.is_error()).count()
  }
}

/// Fetch all integrations of `owner` concurrently.
///
/// One failing integration yields an error envelope and never fails the view.
pub async fn owner_dashboard(
  service: &MetricsService,
  owner: OwnerRef,
  days: u32,
) -> SyncResult<DashboardView> {
  let integrations = service.store().list_integrations_for_owner(owner)?;
  let params = MetricParams::with_days(days);

  let envelopes = join_all(
    integrations
      .iter()
      .map(|integration| service.envelope(integration, &params)),
  )
  .await;

  let view = DashboardView {
    days,
    integrations: envelopes,
  };
  tracing::info!(
    ?owner,
    integrations = view.integrations.len(),
    failed = view.failed_count(),
    "dashboard assembled"
  );
  Ok(view)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::fakes::{tracker_issue, FakeConnector, FakeGitHub, FakeJira, FakeTrello};
  use crate::error::UpstreamError;
  use crate::models::EnvelopeBody;
  use crate::service::tests::{add, service_with, two_merged_one_open};
  use serde_json::json;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_one_failure_does_not_blank_the_view() {
    let connector = FakeConnector {
      github: Arc::new(two_merged_one_open()),
      jira: Arc::new(FakeJira {
        issues: vec![tracker_issue("Bug", "Done", Some("Ada"), Some(3.0))],
        ..FakeJira::default()
      }),
      trello: Arc::new(FakeTrello {
        failure: Some(UpstreamError::network("trello", "connection refused")),
        ..FakeTrello::default()
      }),
    };
    let (service, db) = service_with(connector);
    add(&db, "github", json!({"repository": "acme/app"}));
    add(&db, "jira", json!({"project_key": "OPS"}));
    add(&db, "trello", json!({"board_id": "b1"}));

    let view = owner_dashboard(&service, OwnerRef::Project(1), 30).await.unwrap();

    assert_eq!(view.integrations.len(), 3);
    assert_eq!(view.failed_count(), 1);
    assert!(view.integrations[2].is_error());
    let EnvelopeBody::Metrics(jira) = &view.integrations[1].metrics else {
      panic!("jira envelope should carry metrics");
    };
    assert_eq!(jira.get("completed_story_points"), Some(&json!(3.0)));
  }

  #[tokio::test]
  async fn test_unsupported_type_is_an_error_envelope() {
    let (service, db) = service_with(FakeConnector::with_github(FakeGitHub::default()));
    add(&db, "gitlab", json!({}));
    add(&db, "github", json!({"repository": "acme/app"}));

    let view = owner_dashboard(&service, OwnerRef::Project(1), 7).await.unwrap();
    assert_eq!(
      view.integrations[0].metrics,
      EnvelopeBody::Error {
        error: "Unsupported integration type: gitlab".to_string()
      }
    );
    assert!(!view.integrations[1].is_error());
  }

  #[tokio::test]
  async fn test_empty_owner() {
    let (service, _db) = service_with(FakeConnector::default());
    let view = owner_dashboard(&service, OwnerRef::Team(5), 30).await.unwrap();
    assert!(view.integrations.is_empty());
  }
}
