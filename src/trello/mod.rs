//! Trello access for the board adapter.

mod api_types;
mod client;
mod types;

use async_trait::async_trait;

use crate::error::UpstreamError;

pub use client::TrelloClient;
pub use types::{BoardList, Card};

/// Raw data retrieval from a card-board service.
#[async_trait]
pub trait BoardApi: Send + Sync {
  /// Every list of the board, archived ones included.
  async fn lists(&self, board_id: &str) -> Result<Vec<BoardList>, UpstreamError>;

  /// Every card of the board with members and checklists.
  async fn cards(&self, board_id: &str) -> Result<Vec<Card>, UpstreamError>;
}
