//! Error taxonomy shared by adapters, the registry and the scheduler.

use thiserror::Error;

/// Failures raised while talking to an upstream service.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
  #[error("{service}: network error: {message}")]
  Network {
    service: &'static str,
    message: String,
  },
  #[error("{service}: request timed out after {seconds}s")]
  Timeout { service: &'static str, seconds: u64 },
  #[error("{service}: HTTP {status}: {message}")]
  Http {
    service: &'static str,
    status: u16,
    message: String,
  },
  #[error("{service}: unexpected response: {message}")]
  Decode {
    service: &'static str,
    message: String,
  },
  #[error("{service}: {message}")]
  Service {
    service: &'static str,
    message: String,
  },
  /// GitHub answers 409 for repositories without a single commit.
  #[error("repository {repository} is empty")]
  EmptyRepository { repository: String },
}

impl UpstreamError {
  pub fn network(service: &'static str, err: impl std::fmt::Display) -> Self {
    Self::Network {
      service,
      message: err.to_string(),
    }
  }

  pub fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
    Self::Decode {
      service,
      message: err.to_string(),
    }
  }

  pub fn service(service: &'static str, err: impl std::fmt::Display) -> Self {
    Self::Service {
      service,
      message: err.to_string(),
    }
  }
}

/// Errors surfaced by metric computation and synchronization.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
  #[error("Unsupported integration type: {0}")]
  UnsupportedType(String),
  #[error("{0}")]
  Configuration(String),
  #[error(transparent)]
  Upstream(#[from] UpstreamError),
  #[error("Integration {0} not found")]
  NotFound(i64),
  #[error("integration store: {0}")]
  Store(String),
}

impl SyncError {
  pub fn config(message: impl Into<String>) -> Self {
    Self::Configuration(message.into())
  }

  #[cfg(test)]
  pub fn is_configuration(&self) -> bool {
    matches!(self, Self::Configuration(_))
  }

  /// Message safe to show to a user in an error envelope.
  pub fn user_message(&self) -> String {
    match self {
      Self::UnsupportedType(_) | Self::Configuration(_) | Self::NotFound(_) => self.to_string(),
      Self::Upstream(UpstreamError::EmptyRepository { .. }) => {
        EMPTY_REPOSITORY_MESSAGE.to_string()
      }
      Self::Upstream(_) | Self::Store(_) => {
        "Failed to retrieve metrics. Please check your integration configuration.".to_string()
      }
    }
  }
}

pub const EMPTY_REPOSITORY_MESSAGE: &str =
  "The GitHub repository is empty. Please make at least one commit before syncing.";

impl From<rusqlite::Error> for SyncError {
  fn from(value: rusqlite::Error) -> Self {
    Self::Store(value.to_string())
  }
}

pub type SyncResult<T> = Result<T, SyncError>;
