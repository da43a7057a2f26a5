use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::{SyncError, UpstreamError};
use crate::jira::api_types::{reserialize, ApiIssue, ApiIssueFields, ApiSprintsResponse};
use crate::jira::types::{Board, Sprint, TrackerIssue};
use crate::jira::IssueTrackerApi;

const SERVICE: &str = "jira";

/// Jira API client wrapper
#[derive(Clone)]
pub struct JiraClient {
  client: gouqi::r#async::Jira,
  story_points_field: String,
  timeout: Duration,
}

impl JiraClient {
  pub fn new(
    server: &str,
    username: &str,
    api_token: &str,
    story_points_field: &str,
    timeout: Duration,
  ) -> Result<Self, SyncError> {
    let credentials = gouqi::Credentials::Basic(username.to_string(), api_token.to_string());

    let client = gouqi::r#async::Jira::new(server, credentials)
      .map_err(|e| SyncError::config(format!("Failed to create Jira client: {}", e)))?;

    Ok(Self {
      client,
      story_points_field: story_points_field.to_string(),
      timeout,
    })
  }

  /// gouqi exposes no per-request timeout, so every call is bounded here.
  async fn bounded<T, F>(&self, fut: F) -> Result<T, UpstreamError>
  where
    F: Future<Output = Result<T, UpstreamError>>,
  {
    tokio::time::timeout(self.timeout, fut)
      .await
      .map_err(|_| UpstreamError::Timeout {
        service: SERVICE,
        seconds: self.timeout.as_secs(),
      })?
  }
}

#[async_trait]
impl IssueTrackerApi for JiraClient {
  async fn search_issues(
    &self,
    jql: &str,
    max_results: usize,
  ) -> Result<Vec<TrackerIssue>, UpstreamError> {
    use futures::{StreamExt, TryStreamExt};

    self
      .bounded(async {
        let search = self.client.search();
        let options = gouqi::SearchOptions::default();

        let stream = search
          .stream(jql, &options)
          .await
          .map_err(|e| UpstreamError::service(SERVICE, format!("Failed to search issues: {}", e)))?;

        let field = self.story_points_field.as_str();
        stream
          .take(max_results)
          .map(|issue| {
            let fields: ApiIssueFields = reserialize(&issue.fields)?;
            Ok(ApiIssue { fields }.into_tracker_issue(field))
          })
          .try_collect()
          .await
          .map_err(|e: serde_json::Error| UpstreamError::decode(SERVICE, e))
      })
      .await
  }

  async fn boards(&self, project_key: &str) -> Result<Vec<Board>, UpstreamError> {
    use futures::{StreamExt, TryStreamExt};

    self
      .bounded(async {
        let boards_api = self.client.boards();
        let options = gouqi::SearchOptions::builder()
          .project_key_or_id(project_key)
          .build();

        let stream = boards_api
          .stream(&options)
          .await
          .map_err(|e| UpstreamError::service(SERVICE, format!("Failed to get boards: {}", e)))?;

        stream
          .map(|result| result.map(|board| Board { id: board.id }))
          .try_collect::<Vec<Board>>()
          .await
          .map_err(|e| UpstreamError::service(SERVICE, format!("Failed to list boards: {}", e)))
      })
      .await
  }

  async fn sprints(&self, board_id: u64) -> Result<Vec<Sprint>, UpstreamError> {
    self
      .bounded(async {
        let mut all_sprints = Vec::new();
        let mut start_at = 0u64;
        let max_results = 50u64;

        loop {
          let endpoint = format!(
            "/board/{}/sprint?startAt={}&maxResults={}",
            board_id, start_at, max_results
          );

          let response: ApiSprintsResponse = self
            .client
            .get("agile", &endpoint)
            .await
            .map_err(|e| UpstreamError::service(SERVICE, format!("Failed to get sprints: {}", e)))?;

          let page_len = response.values.len() as u64;
          all_sprints.extend(response.values.into_iter().map(Sprint::from));

          if response.is_last || page_len == 0 {
            break;
          }
          start_at += page_len;
        }

        Ok(all_sprints)
      })
      .await
  }
}
