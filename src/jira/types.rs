/// Issue row used for metric aggregation
#[derive(Debug, Clone)]
pub struct TrackerIssue {
  pub status: String,
  pub issue_type: String,
  pub assignee: Option<String>,
  pub story_points: Option<f64>,
}

/// Board of a project; only its id is needed to reach the sprints
#[derive(Debug, Clone, Copy)]
pub struct Board {
  pub id: u64,
}

/// Sprint on a board
#[derive(Debug, Clone)]
pub struct Sprint {
  /// "active", "closed" or "future"
  pub state: String,
}
