use chrono::{DateTime, Utc};

/// Board list (column)
#[derive(Debug, Clone)]
pub struct BoardList {
  pub id: String,
  pub name: String,
}

/// Card with the details needed for metrics
#[derive(Debug, Clone)]
pub struct Card {
  pub list_id: String,
  pub closed: bool,
  pub due: Option<DateTime<Utc>>,
  pub labels: Vec<String>,
  pub members: Vec<String>,
  pub checklist: ChecklistProgress,
  pub last_activity: Option<DateTime<Utc>>,
}

/// Checked vs total items over all checklists of a card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistProgress {
  pub checked: u32,
  pub total: u32,
}

impl ChecklistProgress {
  /// Completion ratio, or `None` when the card has no checklist items.
  pub fn ratio(&self) -> Option<f64> {
    (self.total > 0).then(|| f64::from(self.checked) / f64::from(self.total))
  }
}
