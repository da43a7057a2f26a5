//! Background synchronization: initial sync after creation and the periodic
//! refresh of every active integration.

pub mod retry;

use chrono::Utc;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{SyncError, SyncResult};
use crate::models::{Integration, MetricParams, DEFAULT_DAYS};
use crate::service::MetricsService;

pub use retry::{Retried, Retryable, RetryPolicy};

/// Lifecycle of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
  Pending,
  Running,
  Succeeded,
  SkippedConfig,
  FailedTransient,
  FailedFatal,
}

/// Terminal result of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Succeeded,
  /// Configuration is incomplete; retrying cannot help.
  SkippedConfig(String),
  FailedTransient(String),
  /// Unknown integration or unsupported type.
  FailedFatal(String),
}

impl SyncOutcome {
  pub fn state(&self) -> SyncState {
    match self {
      Self::Succeeded => SyncState::Succeeded,
      Self::SkippedConfig(_) => SyncState::SkippedConfig,
      Self::FailedTransient(_) => SyncState::FailedTransient,
      Self::FailedFatal(_) => SyncState::FailedFatal,
    }
  }

  /// Success and configuration skips bump `last_sync`; failures leave it
  /// stale so they stay visible.
  pub fn updates_last_sync(&self) -> bool {
    matches!(self, Self::Succeeded | Self::SkippedConfig(_))
  }

  fn from_error(err: &SyncError) -> Self {
    match err {
      SyncError::Configuration(msg) => Self::SkippedConfig(msg.clone()),
      SyncError::UnsupportedType(_) | SyncError::NotFound(_) => Self::FailedFatal(err.to_string()),
      SyncError::Upstream(_) | SyncError::Store(_) => Self::FailedTransient(err.to_string()),
    }
  }
}

impl Retryable for SyncOutcome {
  fn should_retry(&self) -> bool {
    matches!(self, Self::FailedTransient(_))
  }
}

/// Timing and retry bounds of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
  pub interval: Duration,
  pub initial_retry: RetryPolicy,
  pub batch_retry: RetryPolicy,
  pub days: u32,
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(3600),
      initial_retry: RetryPolicy::new(3, Duration::from_secs(60)),
      batch_retry: RetryPolicy::new(2, Duration::from_secs(300)),
      days: DEFAULT_DAYS,
    }
  }
}

/// Result of the initial sync of one integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialSyncReport {
  pub integration_id: i64,
  pub outcome: SyncOutcome,
  pub attempts: u32,
}

/// Result of one periodic batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
  pub outcomes: Vec<(i64, SyncOutcome)>,
}

impl BatchReport {
  pub fn total(&self) -> usize {
    self.outcomes.len()
  }

  pub fn count(&self, state: SyncState) -> usize {
    self
      .outcomes
      .iter()
      .filter(|(_, outcome)| outcome.state() == state)
      .count()
  }

  pub fn failed(&self) -> usize {
    self.count(SyncState::FailedTransient) + self.count(SyncState::FailedFatal)
  }
}

/// Drives metric computation with no caller present.
#[derive(Clone)]
pub struct Scheduler {
  service: MetricsService,
  settings: SchedulerSettings,
}

impl Scheduler {
  pub fn new(service: MetricsService, settings: SchedulerSettings) -> Self {
    Self { service, settings }
  }

  /// One sync attempt for the integration `id`.
  pub async fn sync_integration(&self, id: i64) -> SyncOutcome {
    match self.service.integration(id) {
      Ok(integration) => self.sync_loaded(&integration).await,
      Err(e) => {
        let outcome = SyncOutcome::from_error(&e);
        tracing::error!(integration_id = id, error = %e, "cannot load integration for sync");
        outcome
      }
    }
  }

  async fn sync_loaded(&self, integration: &Integration) -> SyncOutcome {
    let id = integration.id;
    tracing::debug!(integration_id = id, state = ?SyncState::Running, "sync started");

    let params = MetricParams::with_days(self.settings.days);
    let mut outcome = match self.service.compute_metrics(integration, &params).await {
      Ok(memoized) => match memoized.value.error_message() {
        Some(message) => SyncOutcome::FailedTransient(message.to_string()),
        None if memoized.value.is_error() => {
          SyncOutcome::FailedTransient("metrics reported an error".to_string())
        }
        None => SyncOutcome::Succeeded,
      },
      Err(e) => SyncOutcome::from_error(&e),
    };

    if outcome.updates_last_sync() {
      if let Err(e) = self.service.store().update_last_sync(id, Utc::now()) {
        outcome = SyncOutcome::FailedTransient(e.to_string());
      }
    }

    match &outcome {
      SyncOutcome::Succeeded => {
        tracing::info!(integration_id = id, kind = %integration.kind, "integration synced")
      }
      SyncOutcome::SkippedConfig(reason) => {
        tracing::warn!(integration_id = id, reason = %reason, "sync skipped, integration is not fully configured")
      }
      SyncOutcome::FailedTransient(reason) => {
        tracing::warn!(integration_id = id, reason = %reason, "sync failed")
      }
      SyncOutcome::FailedFatal(reason) => {
        tracing::error!(integration_id = id, reason = %reason, "sync failed permanently")
      }
    }
    outcome
  }

  /// Initial sync of a new integration, retried while it fails transiently.
  pub async fn run_initial_sync(&self, id: i64) -> InitialSyncReport {
    let retried = self
      .settings
      .initial_retry
      .run(|attempt| {
        tracing::debug!(integration_id = id, attempt, "initial sync attempt");
        self.sync_integration(id)
      })
      .await;

    if retried.exhausted() {
      tracing::error!(integration_id = id, attempts = retried.attempts, "initial sync abandoned");
    }
    InitialSyncReport {
      integration_id: id,
      outcome: retried.value,
      attempts: retried.attempts,
    }
  }

  /// Run the initial sync on a background task.
  pub fn enqueue_initial_sync(&self, id: i64) -> JoinHandle<InitialSyncReport> {
    tracing::debug!(integration_id = id, state = ?SyncState::Pending, "initial sync queued");
    let scheduler = self.clone();
    tokio::spawn(async move { scheduler.run_initial_sync(id).await })
  }

  async fn active_integrations(&self) -> SyncResult<Vec<Integration>> {
    self.service.store().list_active_integrations()
  }

  /// Sync every active integration once.
  ///
  /// Each integration runs on its own task. A failure or panic is recorded
  /// and the rest of the batch carries on. Only listing the integrations is
  /// retried.
  pub async fn run_periodic_sync(&self) -> SyncResult<BatchReport> {
    let Retried { value, attempts } = self
      .settings
      .batch_retry
      .run(|_| self.active_integrations())
      .await;
    let integrations = value.map_err(|e| {
      tracing::error!(attempts, error = %e, "failed to list active integrations");
      e
    })?;

    let started = Instant::now();
    let tasks: Vec<(i64, JoinHandle<SyncOutcome>)> = integrations
      .into_iter()
      .map(|integration| {
        let scheduler = self.clone();
        let id = integration.id;
        (id, tokio::spawn(async move { scheduler.sync_loaded(&integration).await }))
      })
      .collect();

    let (ids, handles): (Vec<i64>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(handles).await;

    let mut report = BatchReport::default();
    for (id, result) in ids.into_iter().zip(results) {
      let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
          tracing::error!(integration_id = id, error = %e, "sync task aborted");
          SyncOutcome::FailedFatal(format!("sync task aborted: {}", e))
        }
      };
      report.outcomes.push((id, outcome));
    }

    tracing::info!(
      total = report.total(),
      succeeded = report.count(SyncState::Succeeded),
      skipped = report.count(SyncState::SkippedConfig),
      failed = report.failed(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "periodic sync finished"
    );
    Ok(report)
  }

  /// Run the periodic sync every interval until `shutdown` turns true or its
  /// sender is dropped. The first batch runs one interval after start.
  pub fn spawn_periodic(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let scheduler = self.clone();
    tokio::spawn(async move {
      let period = scheduler.settings.interval;
      let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      tracing::info!(interval_secs = period.as_secs(), "periodic sync scheduled");

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = scheduler.run_periodic_sync().await {
              tracing::error!(error = %e, "periodic sync batch failed");
            }
          }
          changed = shutdown.changed() => {
            if changed.is_err() || *shutdown.borrow() {
              break;
            }
          }
        }
      }
      tracing::info!("periodic sync stopped");
    })
  }
}
