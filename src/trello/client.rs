use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{ApiCard, ApiList};
use super::types::{BoardList, Card};
use super::BoardApi;
use crate::error::{SyncError, UpstreamError};

const SERVICE: &str = "trello";
const DEFAULT_API_URL: &str = "https://api.trello.com/1";
const CARD_FIELDS: &str = "name,idList,closed,due,labels,dateLastActivity";

/// Trello REST client authenticated with an API key and token
#[derive(Clone)]
pub struct TrelloClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  token: String,
  timeout: Duration,
}

impl TrelloClient {
  pub fn new(
    api_key: &str,
    token: &str,
    api_url: Option<&str>,
    timeout: Duration,
  ) -> Result<Self, SyncError> {
    let raw = api_url.unwrap_or(DEFAULT_API_URL);
    let base = Url::parse(&format!("{}/", raw.trim_end_matches('/')))
      .map_err(|e| SyncError::config(format!("Invalid Trello API URL {}: {}", raw, e)))?;
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| UpstreamError::network(SERVICE, e))?;

    Ok(Self {
      http,
      base,
      api_key: api_key.to_string(),
      token: token.to_string(),
      timeout,
    })
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<T, UpstreamError> {
    let url = self
      .base
      .join(path)
      .map_err(|e| UpstreamError::service(SERVICE, format!("invalid request path {}: {}", path, e)))?;

    let response = self
      .http
      .get(url)
      .query(&[("key", self.api_key.as_str()), ("token", self.token.as_str())])
      .query(query)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          UpstreamError::Timeout {
            service: SERVICE,
            seconds: self.timeout.as_secs(),
          }
        } else {
          UpstreamError::network(SERVICE, e)
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      // Trello error bodies are plain text ("invalid id", "unauthorized permission requested")
      let message = response.text().await.unwrap_or_default();
      return Err(UpstreamError::Http {
        service: SERVICE,
        status: status.as_u16(),
        message,
      });
    }

    response
      .json::<T>()
      .await
      .map_err(|e| UpstreamError::decode(SERVICE, e))
  }
}

#[async_trait]
impl BoardApi for TrelloClient {
  async fn lists(&self, board_id: &str) -> Result<Vec<BoardList>, UpstreamError> {
    let lists: Vec<ApiList> = self
      .get_json(
        &format!("boards/{}/lists", board_id),
        &[("filter", "all"), ("fields", "name,closed,pos")],
      )
      .await?;
    Ok(lists.into_iter().map(BoardList::from).collect())
  }

  async fn cards(&self, board_id: &str) -> Result<Vec<Card>, UpstreamError> {
    let cards: Vec<ApiCard> = self
      .get_json(
        &format!("boards/{}/cards/all", board_id),
        &[
          ("fields", CARD_FIELDS),
          ("members", "true"),
          ("member_fields", "fullName"),
          ("checklists", "all"),
        ],
      )
      .await?;
    Ok(cards.into_iter().map(Card::from).collect())
  }
}
