use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry bound evaluated around a fallible call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub delay: Duration,
}

/// Whether an attempt's result asks for another attempt.
pub trait Retryable {
  fn should_retry(&self) -> bool;
}

impl<T, E> Retryable for Result<T, E> {
  fn should_retry(&self) -> bool {
    self.is_err()
  }
}

/// Final result of a retried call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
  pub value: T,
  pub attempts: u32,
}

impl<T: Retryable> Retried<T> {
  /// True when the last attempt still asked for a retry.
  pub fn exhausted(&self) -> bool {
    self.value.should_retry()
  }
}

impl RetryPolicy {
  /// At least one attempt is always made.
  pub fn new(max_attempts: u32, delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      delay,
    }
  }

  /// Run `op` until it yields a result that needs no retry or the attempts
  /// are used up. `op` receives the 1-based attempt number.
  pub async fn run<T, F, Fut>(&self, mut op: F) -> Retried<T>
  where
    T: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      let value = op(attempt).await;
      if !value.should_retry() || attempt >= max_attempts {
        return Retried {
          value,
          attempts: attempt,
        };
      }

      tracing::debug!(attempt, max_attempts, delay = ?self.delay, "attempt failed, retrying");
      tokio::time::sleep(self.delay).await;
      attempt += 1;
    }
  }
}
