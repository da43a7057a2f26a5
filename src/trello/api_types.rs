//! Serde-deserializable types matching Trello REST API responses.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{BoardList, Card, ChecklistProgress};

#[derive(Debug, Deserialize)]
pub struct ApiList {
  pub id: String,
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLabel {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMember {
  #[serde(rename = "fullName", default)]
  pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCheckItem {
  #[serde(default)]
  pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiChecklist {
  #[serde(rename = "checkItems", default)]
  pub check_items: Vec<ApiCheckItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCard {
  #[serde(rename = "idList", default)]
  pub id_list: String,
  #[serde(default)]
  pub closed: bool,
  pub due: Option<DateTime<Utc>>,
  #[serde(default)]
  pub labels: Vec<ApiLabel>,
  #[serde(default)]
  pub members: Vec<ApiMember>,
  #[serde(default)]
  pub checklists: Vec<ApiChecklist>,
  #[serde(rename = "dateLastActivity")]
  pub date_last_activity: Option<DateTime<Utc>>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiList> for BoardList {
  fn from(l: ApiList) -> Self {
    BoardList {
      id: l.id,
      name: l.name,
    }
  }
}

impl From<ApiCard> for Card {
  fn from(c: ApiCard) -> Self {
    let checklist = c
      .checklists
      .iter()
      .flat_map(|cl| cl.check_items.iter())
      .fold(ChecklistProgress::default(), |mut acc, item| {
        acc.total += 1;
        if item.state == "complete" {
          acc.checked += 1;
        }
        acc
      });

    Card {
      list_id: c.id_list,
      closed: c.closed,
      due: c.due,
      // Unnamed labels are identified by their colour in the Trello UI
      labels: c
        .labels
        .into_iter()
        .filter_map(|l| {
          if l.name.is_empty() {
            l.color
          } else {
            Some(l.name)
          }
        })
        .collect(),
      members: c
        .members
        .into_iter()
        .map(|m| m.full_name)
        .filter(|n| !n.is_empty())
        .collect(),
      checklist,
      last_activity: c.date_last_activity,
    }
  }
}
