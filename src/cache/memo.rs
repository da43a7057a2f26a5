//! Memoizing wrapper that puts a metric computation behind the cache store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::key::CacheKey;
use super::store::{CacheError, CacheStore};
use crate::models::Metrics;

/// Default time-to-live of cached metrics.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// Indicates where a memoized value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Computed by calling the upstream service
  Network,
  /// Served from the cache store without calling upstream
  Cache,
}

/// A value together with its source.
#[derive(Debug, Clone)]
pub struct Memoized<T> {
  pub value: T,
  pub source: CacheSource,
}

/// Wraps computations with cache-get, call-on-miss, cache-set.
///
/// The store is injected at construction. Store failures are logged and
/// otherwise ignored: a broken cache degrades to direct computation.
#[derive(Clone)]
pub struct Memoizer {
  store: Arc<dyn CacheStore>,
  ttl: Duration,
}

impl Memoizer {
  pub fn new(store: Arc<dyn CacheStore>) -> Self {
    Self {
      store,
      ttl: DEFAULT_TTL,
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Memoize with the configured TTL.
  pub async fn fetch<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<Memoized<Metrics>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Metrics, E>>,
  {
    self.memoize(self.ttl, key, compute).await
  }

  /// Return the cached metrics for `key`, or run `compute` and cache its result.
  ///
  /// Errors from `compute` are returned as-is and nothing is cached. Results
  /// that carry an `error` field are returned but not cached either.
  pub async fn memoize<F, Fut, E>(
    &self,
    ttl: Duration,
    key: &CacheKey,
    compute: F,
  ) -> Result<Memoized<Metrics>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Metrics, E>>,
  {
    if let Some(cached) = self.read(key).await {
      tracing::debug!(key = %key, "cache hit");
      return Ok(Memoized {
        value: cached,
        source: CacheSource::Cache,
      });
    }

    tracing::debug!(key = %key, "cache miss");
    let value = compute().await?;

    if value.is_error() {
      tracing::debug!(key = %key, "not caching error result");
    } else {
      self.write(key, &value, ttl).await;
    }

    Ok(Memoized {
      value,
      source: CacheSource::Network,
    })
  }

  async fn read(&self, key: &CacheKey) -> Option<Metrics> {
    let store = Arc::clone(&self.store);
    let lookup = key.as_str().to_string();
    let bytes = match run_blocking(move || store.get(&lookup)).await {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return None,
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "cache read failed, bypassing cache");
        return None;
      }
    };

    match Metrics::from_bytes(&bytes) {
      Ok(metrics) => Some(metrics),
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
        None
      }
    }
  }

  async fn write(&self, key: &CacheKey, value: &Metrics, ttl: Duration) {
    let bytes = match value.to_bytes() {
      Ok(bytes) => bytes,
      Err(e) => {
        tracing::warn!(key = %key, error = %e, "failed to serialize metrics for cache");
        return;
      }
    };

    let store = Arc::clone(&self.store);
    let target = key.as_str().to_string();
    if let Err(e) = run_blocking(move || store.set(&target, &bytes, ttl)).await {
      tracing::warn!(key = %key, error = %e, "cache write failed");
    }
  }
}

/// Run a blocking store call off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, CacheError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, CacheError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| CacheError::Unavailable(format!("cache task failed: {}", e)))?
}
