//! Adapters: one uniform metrics interface over three upstream services.
//!
//! Each adapter kind implements [`MetricSource`] (raw retrieval plus
//! aggregation). [`Adapter`] pairs one of them with the injected
//! [`Memoizer`] and dispatches on the kind tag.

mod board;
mod config;
mod issue_tracker;
mod source_control;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::cache::{CacheKey, Memoized, Memoizer};
use crate::error::{SyncError, SyncResult};
use crate::models::Metrics;

pub use board::BoardAdapter;
pub use config::{BoardConfig, IssueTrackerConfig, SourceControlConfig};
pub use issue_tracker::IssueTrackerAdapter;
pub use source_control::SourceControlAdapter;

/// The supported integration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdapterKind {
  SourceControl,
  IssueTracker,
  Board,
}

impl AdapterKind {
  pub const ALL: [AdapterKind; 3] = [Self::SourceControl, Self::IssueTracker, Self::Board];

  /// Parse a stored type tag (case-insensitive).
  pub fn parse(tag: &str) -> SyncResult<Self> {
    match tag.trim().to_ascii_lowercase().as_str() {
      "github" => Ok(Self::SourceControl),
      "jira" => Ok(Self::IssueTracker),
      "trello" => Ok(Self::Board),
      _ => Err(SyncError::UnsupportedType(tag.to_string())),
    }
  }

  pub fn tag(&self) -> &'static str {
    match self {
      Self::SourceControl => "github",
      Self::IssueTracker => "jira",
      Self::Board => "trello",
    }
  }

  /// Name of the parameter that identifies what the adapter looks at.
  pub fn identity_param(&self) -> &'static str {
    match self {
      Self::SourceControl => "repository",
      Self::IssueTracker => "project_key",
      Self::Board => "board_id",
    }
  }

  /// Reported when neither the request nor the stored config names a locator.
  pub fn missing_locator_message(&self) -> &'static str {
    match self {
      Self::SourceControl => {
        "Repository name not configured. Please edit the integration to add a repository."
      }
      Self::IssueTracker => "project_key is required for Jira metrics",
      Self::Board => "board_id is required for Trello metrics",
    }
  }
}

impl fmt::Display for AdapterKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// Raw retrieval and aggregation for one adapter kind.
#[async_trait]
pub trait MetricSource: Send + Sync {
  type Raw: Send;

  /// Fetch the rows created within the last `days` days.
  async fn fetch_raw(&self, locator: &str, days: u32) -> SyncResult<Self::Raw>;

  /// Turn raw rows into metrics. Pure; `now` is the reference time.
  fn aggregate(&self, locator: &str, days: u32, raw: Self::Raw, now: DateTime<Utc>) -> Metrics;

  async fn compute_metrics(&self, locator: &str, days: u32) -> SyncResult<Metrics> {
    let raw = self.fetch_raw(locator, days).await?;
    Ok(self.aggregate(locator, days, raw, Utc::now()))
  }
}

/// Kind-tagged adapter implementation.
pub enum AdapterSource {
  SourceControl(SourceControlAdapter),
  IssueTracker(IssueTrackerAdapter),
  Board(BoardAdapter),
}

/// An adapter built for one invocation, with its cache wrapper.
pub struct Adapter {
  source: AdapterSource,
  memo: Memoizer,
  /// Upstream host when it is not the service's public endpoint
  host: Option<String>,
}

impl Adapter {
  pub fn new(source: AdapterSource, memo: Memoizer) -> Self {
    Self {
      source,
      memo,
      host: None,
    }
  }

  /// Keep cached results of different upstream hosts apart.
  pub fn with_host(mut self, host: Option<String>) -> Self {
    self.host = host;
    self
  }

  pub fn kind(&self) -> AdapterKind {
    match &self.source {
      AdapterSource::SourceControl(_) => AdapterKind::SourceControl,
      AdapterSource::IssueTracker(_) => AdapterKind::IssueTracker,
      AdapterSource::Board(_) => AdapterKind::Board,
    }
  }

  /// Locator stored in the adapter's own config, if any.
  pub fn stored_locator(&self) -> Option<&str> {
    match &self.source {
      AdapterSource::SourceControl(a) => a.repository(),
      AdapterSource::IssueTracker(a) => a.project_key(),
      AdapterSource::Board(a) => a.board_id(),
    }
  }

  /// Compute metrics for `locator`, served from cache when possible.
  pub async fn compute_metrics(&self, locator: &str, days: u32) -> SyncResult<Memoized<Metrics>> {
    let key = CacheKey::for_metrics(self.kind(), locator, days).on_host(self.host.as_deref());
    self
      .memo
      .fetch(&key, || async move {
        match &self.source {
          AdapterSource::SourceControl(a) => a.compute_metrics(locator, days).await,
          AdapterSource::IssueTracker(a) => a.compute_metrics(locator, days).await,
          AdapterSource::Board(a) => a.compute_metrics(locator, days).await,
        }
      })
      .await
  }
}

/// Start of the lookback window. A window reaching past the representable
/// dates is a configuration error.
pub(crate) fn window_start(now: DateTime<Utc>, days: u32) -> SyncResult<DateTime<Utc>> {
  now
    .checked_sub_signed(Duration::days(i64::from(days)))
    .ok_or_else(|| SyncError::config(format!("days out of range: {}", days)))
}

/// Reject an empty locator before any network call.
pub(crate) fn require_locator(locator: &str, message: &str) -> SyncResult<()> {
  if locator.trim().is_empty() {
    return Err(SyncError::config(message));
  }
  Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
  let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
  (count > 0).then(|| sum / count as f64)
}

fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
  (end - start).num_seconds() as f64 / 3600.0
}

/// Count occurrences, keyed and ordered by value.
fn distribution<'a>(items: impl Iterator<Item = &'a str>) -> serde_json::Map<String, serde_json::Value> {
  let mut counts = std::collections::BTreeMap::<&str, u64>::new();
  for item in items {
    *counts.entry(item).or_default() += 1;
  }
  counts
    .into_iter()
    .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
    .collect()
}

#[cfg(test)]
pub(crate) mod fakes;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_is_case_insensitive() {
    assert_eq!(AdapterKind::parse("GitHub").unwrap(), AdapterKind::SourceControl);
    assert_eq!(AdapterKind::parse(" jira ").unwrap(), AdapterKind::IssueTracker);
    assert_eq!(AdapterKind::parse("TRELLO").unwrap(), AdapterKind::Board);
  }

  #[test]
  fn test_parse_rejects_unknown_tags() {
    let err = AdapterKind::parse("gitlab").unwrap_err();
    assert!(matches!(err, SyncError::UnsupportedType(tag) if tag == "gitlab"));
  }

  #[test]
  fn test_distribution_counts() {
    let dist = distribution(["ada", "bob", "ada"].into_iter());
    assert_eq!(dist["ada"], serde_json::json!(2));
    assert_eq!(dist["bob"], serde_json::json!(1));
  }

  #[test]
  fn test_mean_of_nothing() {
    assert_eq!(mean(std::iter::empty()), None);
    assert_eq!(mean([1.0, 2.0].into_iter()), Some(1.5));
  }
}
