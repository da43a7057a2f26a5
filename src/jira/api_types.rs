//! Serde-deserializable types matching Jira API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on metric aggregation.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Re-serialize a value through JSON to convert between compatible types.
/// Useful for converting gouqi's BTreeMap fields to our typed structs.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssueType {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  #[serde(rename = "displayName")]
  pub display_name: String,
}

// ============================================================================
// Issue fields
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiIssueFields {
  pub status: Option<ApiStatus>,
  #[serde(rename = "issuetype")]
  pub issue_type: Option<ApiIssueType>,
  pub assignee: Option<ApiUser>,
  // Catch-all for custom fields (story points live here)
  #[serde(flatten)]
  pub extra: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  #[serde(default)]
  pub fields: ApiIssueFields,
}

// ============================================================================
// Sprint endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSprint {
  #[serde(default)]
  pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSprintsResponse {
  #[serde(default)]
  pub values: Vec<ApiSprint>,
  #[serde(rename = "isLast", default = "default_true")]
  pub is_last: bool,
}

fn default_true() -> bool {
  true
}

// ============================================================================
// Conversions to domain types
// ============================================================================

use super::types::{Sprint, TrackerIssue};

impl ApiIssue {
  pub fn into_tracker_issue(self, story_points_field: &str) -> TrackerIssue {
    let f = self.fields;
    let story_points = extract_number(f.extra.get(story_points_field));
    TrackerIssue {
      status: f.status.map(|s| s.name).unwrap_or_default(),
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      assignee: f.assignee.map(|u| u.display_name),
      story_points,
    }
  }
}

impl From<ApiSprint> for Sprint {
  fn from(s: ApiSprint) -> Self {
    Sprint { state: s.state }
  }
}

/// Story point fields are usually numbers, but some instances store strings.
fn extract_number(value: Option<&serde_json::Value>) -> Option<f64> {
  let value = value?;
  if let Some(n) = value.as_f64() {
    return Some(n);
  }
  value.as_str().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_story_points_from_custom_field() {
    let issue: ApiIssue = serde_json::from_value(json!({
      "key": "OPS-1",
      "fields": {
        "status": {"name": "Done"},
        "issuetype": {"name": "Story"},
        "assignee": {"displayName": "Ada"},
        "created": "2024-03-01T10:00:00.000+0000",
        "customfield_10002": 5.0
      }
    }))
    .unwrap();

    let row = issue.into_tracker_issue("customfield_10002");
    assert_eq!(row.story_points, Some(5.0));
    assert_eq!(row.assignee.as_deref(), Some("Ada"));
    assert_eq!(row.status, "Done");
  }

  #[test]
  fn test_story_points_as_text_and_missing() {
    assert_eq!(extract_number(Some(&json!("3"))), Some(3.0));
    assert_eq!(extract_number(Some(&json!(null))), None);
    assert_eq!(extract_number(None), None);
  }

  #[test]
  fn test_sprint_page_defaults_to_last() {
    let page: ApiSprintsResponse =
      serde_json::from_value(json!({"values": [{"id": 1, "state": "active"}]})).unwrap();
    assert!(page.is_last);
    assert_eq!(Sprint::from(page.values.into_iter().next().unwrap()).state, "active");
  }
}
