//! Metric requests for stored integrations.

use chrono::Utc;
use std::sync::Arc;

use crate::adapters::AdapterKind;
use crate::cache::{CacheSource, Memoized};
use crate::db::IntegrationStore;
use crate::error::{SyncError, SyncResult, UpstreamError};
use crate::models::{Integration, MetricParams, Metrics, MetricsEnvelope};
use crate::registry::Registry;

/// Entry point used by the CLI, the dashboard and the scheduler.
#[derive(Clone)]
pub struct MetricsService {
  registry: Registry,
  store: Arc<dyn IntegrationStore>,
}

impl MetricsService {
  pub fn new(registry: Registry, store: Arc<dyn IntegrationStore>) -> Self {
    Self { registry, store }
  }

  pub fn store(&self) -> &Arc<dyn IntegrationStore> {
    &self.store
  }

  /// Load an integration or fail with `NotFound`.
  pub fn integration(&self, id: i64) -> SyncResult<Integration> {
    self.store.get_integration(id)?.ok_or(SyncError::NotFound(id))
  }

  /// Compute metrics for `integration`. Every failure is raised as a typed
  /// error; the source-control adapter may still return an error-carrying result.
  pub async fn compute_metrics(
    &self,
    integration: &Integration,
    params: &MetricParams,
  ) -> SyncResult<Memoized<Metrics>> {
    let adapter = self
      .registry
      .create_adapter(&integration.kind, &integration.adapter_config())?;
    let memoized = self
      .registry
      .compute_metrics(&adapter, &params.resolved_for(integration))
      .await?;
    tracing::debug!(
      integration_id = integration.id,
      kind = %adapter.kind(),
      cached = memoized.source == CacheSource::Cache,
      "metrics computed"
    );
    Ok(memoized)
  }

  /// Metrics for one integration wrapped in an envelope.
  ///
  /// Unknown integrations and unsupported types are raised. Configuration and
  /// upstream failures come back as an error envelope. A clean result bumps
  /// `last_sync`.
  pub async fn request_metrics(&self, id: i64, params: &MetricParams) -> SyncResult<MetricsEnvelope> {
    let integration = self.integration(id)?;
    AdapterKind::parse(&integration.kind)?;

    let metrics = match self.compute_metrics(&integration, params).await {
      Ok(memoized) => memoized.value,
      Err(e @ SyncError::Store(_)) => return Err(e),
      Err(e) => {
        tracing::warn!(integration_id = id, error = %e, "metrics request failed");
        return Ok(MetricsEnvelope::error(&integration, e.user_message()));
      }
    };

    if !metrics.is_error() {
      self.store.update_last_sync(id, Utc::now())?;
    }
    Ok(MetricsEnvelope::ok(&integration, metrics))
  }

  /// Compute metrics and raise on any failure, including results that only
  /// carry an error.
  pub async fn validate(&self, id: i64, params: &MetricParams) -> SyncResult<Metrics> {
    let integration = self.integration(id)?;
    let metrics = self.compute_metrics(&integration, params).await?.value;
    match metrics.error_message() {
      Some(message) => Err(SyncError::Upstream(UpstreamError::service(
        AdapterKind::parse(&integration.kind)?.tag(),
        message,
      ))),
      None => Ok(metrics),
    }
  }

  /// Envelope for one integration that never fails.
  pub async fn envelope(&self, integration: &Integration, params: &MetricParams) -> MetricsEnvelope {
    match self.compute_metrics(integration, params).await {
      Ok(memoized) => MetricsEnvelope::ok(integration, memoized.value),
      Err(e) => {
        tracing::warn!(integration_id = integration.id, error = %e, "integration metrics unavailable");
        MetricsEnvelope::error(integration, e.user_message())
      }
    }
  }
}
