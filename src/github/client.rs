use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{ApiCommitDetail, ApiCommitRef, ApiErrorBody, ApiIssue, ApiPullRequest};
use super::types::{Commit, PullRequest, RepoIssue};
use super::SourceControlApi;
use crate::error::{SyncError, UpstreamError};

const SERVICE: &str = "github";
const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
/// Hard stop for pagination on very busy repositories.
const MAX_PAGES: u32 = 30;
/// Parallel requests when pulling per-commit stats.
const COMMIT_DETAIL_CONCURRENCY: usize = 8;
const EMPTY_REPOSITORY_MARKER: &str = "Git Repository is empty";

/// GitHub REST client
#[derive(Clone)]
pub struct GitHubClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
  timeout: Duration,
}

impl GitHubClient {
  pub fn new(token: Option<String>, api_url: Option<&str>, timeout: Duration) -> Result<Self, SyncError> {
    let base = api_base(api_url.unwrap_or(DEFAULT_API_URL))?;
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| UpstreamError::network(SERVICE, e))?;

    Ok(Self {
      http,
      base,
      token,
      timeout,
    })
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    repository: &str,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, UpstreamError> {
    let url = self
      .base
      .join(path)
      .map_err(|e| UpstreamError::service(SERVICE, format!("invalid request path {}: {}", path, e)))?;

    let mut request = self
      .http
      .get(url)
      .query(query)
      .header(ACCEPT, "application/vnd.github+json")
      .header(USER_AGENT, concat!("agiletrack-sync/", env!("CARGO_PKG_VERSION")));
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| transport_error(e, self.timeout))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(classify_failure(repository, status, &body));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| UpstreamError::decode(SERVICE, e))
  }

  async fn commit_detail(&self, repository: &str, sha: String) -> Result<Commit, UpstreamError> {
    let detail: ApiCommitDetail = self
      .get_json(repository, &format!("repos/{}/commits/{}", repository, sha), &[])
      .await?;
    Ok(detail.into())
  }
}

#[async_trait]
impl SourceControlApi for GitHubClient {
  async fn pull_requests(
    &self,
    repository: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<PullRequest>, UpstreamError> {
    let path = format!("repos/{}/pulls", repository);
    let mut out = Vec::new();

    // Sorted newest first, so the first row older than `since` ends the scan.
    'pages: for page in 1..=MAX_PAGES {
      let rows: Vec<ApiPullRequest> = self
        .get_json(repository, &path, &page_query("all", page))
        .await?;
      let last_page = rows.len() < PER_PAGE;

      for pr in rows {
        if pr.created_at < since {
          break 'pages;
        }
        out.push(PullRequest::from(pr));
      }

      if last_page {
        break;
      }
    }

    Ok(out)
  }

  async fn commits(
    &self,
    repository: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<Commit>, UpstreamError> {
    let path = format!("repos/{}/commits", repository);
    let mut shas = Vec::new();

    for page in 1..=MAX_PAGES {
      let query = vec![
        ("since", since.to_rfc3339()),
        ("per_page", PER_PAGE.to_string()),
        ("page", page.to_string()),
      ];
      let rows: Vec<ApiCommitRef> = self.get_json(repository, &path, &query).await?;
      let last_page = rows.len() < PER_PAGE;
      shas.extend(rows.into_iter().map(|c| c.sha));
      if last_page {
        break;
      }
    }

    futures::stream::iter(shas)
      .map(|sha| self.commit_detail(repository, sha))
      .buffered(COMMIT_DETAIL_CONCURRENCY)
      .try_collect()
      .await
  }

  async fn issues(
    &self,
    repository: &str,
    since: DateTime<Utc>,
  ) -> Result<Vec<RepoIssue>, UpstreamError> {
    let path = format!("repos/{}/issues", repository);
    let mut out = Vec::new();

    'pages: for page in 1..=MAX_PAGES {
      let rows: Vec<ApiIssue> = self
        .get_json(repository, &path, &page_query("all", page))
        .await?;
      let last_page = rows.len() < PER_PAGE;

      for issue in rows {
        if issue.created_at < since {
          break 'pages;
        }
        if issue.is_pull_request() {
          continue;
        }
        out.push(RepoIssue::from(issue));
      }

      if last_page {
        break;
      }
    }

    Ok(out)
  }
}

fn page_query(state: &str, page: u32) -> Vec<(&'static str, String)> {
  vec![
    ("state", state.to_string()),
    ("sort", "created".to_string()),
    ("direction", "desc".to_string()),
    ("per_page", PER_PAGE.to_string()),
    ("page", page.to_string()),
  ]
}

/// Parse the API base, making sure relative joins land under it.
fn api_base(raw: &str) -> Result<Url, SyncError> {
  Url::parse(&format!("{}/", raw.trim_end_matches('/')))
    .map_err(|e| SyncError::config(format!("Invalid GitHub API URL {}: {}", raw, e)))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> UpstreamError {
  if err.is_timeout() {
    UpstreamError::Timeout {
      service: SERVICE,
      seconds: timeout.as_secs(),
    }
  } else {
    UpstreamError::network(SERVICE, err)
  }
}

/// Map a non-success response to an upstream error.
fn classify_failure(repository: &str, status: StatusCode, body: &str) -> UpstreamError {
  let message = serde_json::from_str::<ApiErrorBody>(body)
    .map(|b| b.message)
    .unwrap_or_else(|_| body.to_string());

  if status == StatusCode::CONFLICT && message.contains(EMPTY_REPOSITORY_MARKER) {
    return UpstreamError::EmptyRepository {
      repository: repository.to_string(),
    };
  }

  UpstreamError::Http {
    service: SERVICE,
    status: status.as_u16(),
    message,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_repository_is_recognized() {
    let err = classify_failure(
      "acme/fresh",
      StatusCode::CONFLICT,
      r#"{"message": "Git Repository is empty.", "documentation_url": "https://docs.github.com"}"#,
    );
    assert!(matches!(err, UpstreamError::EmptyRepository { repository } if repository == "acme/fresh"));
  }

  #[test]
  fn test_other_conflicts_stay_http_errors() {
    let err = classify_failure("acme/app", StatusCode::CONFLICT, "merge conflict");
    assert!(matches!(err, UpstreamError::Http { status: 409, .. }));
  }

  #[test]
  fn test_rate_limit_keeps_message() {
    let err = classify_failure(
      "acme/app",
      StatusCode::FORBIDDEN,
      r#"{"message": "API rate limit exceeded"}"#,
    );
    match err {
      UpstreamError::Http { status, message, .. } => {
        assert_eq!(status, 403);
        assert_eq!(message, "API rate limit exceeded");
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_api_base_joins_relative_paths() {
    let base = api_base("https://github.example.com/api/v3/").unwrap();
    assert_eq!(
      base.join("repos/a/b/pulls").unwrap().as_str(),
      "https://github.example.com/api/v3/repos/a/b/pulls"
    );
    assert!(api_base("not a url").is_err());
  }
}
