use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::{distribution, mean, require_locator, window_start, AdapterKind, MetricSource};
use crate::error::SyncResult;
use crate::models::Metrics;
use crate::trello::{BoardApi, BoardList, Card};

/// Lists and recently active cards of one board.
#[derive(Debug, Clone, Default)]
pub struct BoardRaw {
  pub lists: Vec<BoardList>,
  pub cards: Vec<Card>,
}

/// Card flow metrics for one board.
pub struct BoardAdapter {
  api: Arc<dyn BoardApi>,
  board_id: Option<String>,
}

impl BoardAdapter {
  pub fn new(api: Arc<dyn BoardApi>, board_id: Option<String>) -> Self {
    Self { api, board_id }
  }

  pub fn board_id(&self) -> Option<&str> {
    self.board_id.as_deref()
  }
}

#[async_trait]
impl MetricSource for BoardAdapter {
  type Raw = BoardRaw;

  async fn fetch_raw(&self, board_id: &str, days: u32) -> SyncResult<BoardRaw> {
    require_locator(board_id, AdapterKind::Board.missing_locator_message())?;
    let since = window_start(Utc::now(), days)?;

    let (lists, cards) = tokio::try_join!(self.api.lists(board_id), self.api.cards(board_id))?;

    // Cards without an activity date are kept
    let total = cards.len();
    let cards: Vec<Card> = cards
      .into_iter()
      .filter(|c| c.last_activity.map_or(true, |at| at >= since))
      .collect();

    tracing::debug!(board_id, lists = lists.len(), cards = cards.len(), total, "fetched board activity");
    Ok(BoardRaw { lists, cards })
  }

  fn aggregate(&self, _board_id: &str, _days: u32, raw: BoardRaw, now: DateTime<Utc>) -> Metrics {
    let mut metrics = Metrics::new();
    let cards = &raw.cards;
    if cards.is_empty() {
      return metrics;
    }

    let list_names: HashMap<&str, &str> = raw
      .lists
      .iter()
      .map(|l| (l.id.as_str(), l.name.as_str()))
      .collect();
    metrics.insert(
      "card_counts_by_list",
      distribution(cards.iter().map(|c| {
        list_names
          .get(c.list_id.as_str())
          .copied()
          .unwrap_or(c.list_id.as_str())
      })),
    );

    let closed = cards.iter().filter(|c| c.closed).count();
    metrics.insert("closed_card_count", closed as u64);
    metrics.insert("open_card_count", (cards.len() - closed) as u64);

    let due: Vec<DateTime<Utc>> = cards.iter().filter_map(|c| c.due).collect();
    metrics.insert("cards_with_due_count", due.len() as u64);
    metrics.insert(
      "overdue_card_count",
      due.iter().filter(|d| **d < now).count() as u64,
    );

    if let Some(avg) = mean(cards.iter().filter_map(|c| c.checklist.ratio())) {
      metrics.insert("avg_checklist_completion", avg);
    }

    metrics.insert(
      "label_distribution",
      distribution(cards.iter().flat_map(|c| c.labels.iter().map(String::as_str))),
    );
    metrics.insert(
      "member_distribution",
      distribution(cards.iter().flat_map(|c| c.members.iter().map(String::as_str))),
    );

    metrics
  }
}
