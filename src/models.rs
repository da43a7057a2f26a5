//! Domain types shared across adapters, the scheduler and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Default lookback window in days.
pub const DEFAULT_DAYS: u32 = 30;

/// Project/team that owns an integration. Opaque to the sync core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
  pub project_id: Option<i64>,
  pub team_id: Option<i64>,
}

/// A configured connection to one external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
  pub id: i64,
  pub name: String,
  /// Type tag as stored; validated when an adapter is built.
  pub kind: String,
  pub api_key: Option<String>,
  pub api_url: Option<String>,
  pub username: Option<String>,
  #[serde(default)]
  pub config: Map<String, Value>,
  pub active: bool,
  pub last_sync: Option<DateTime<Utc>>,
  #[serde(default)]
  pub owner: Owner,
}

impl Integration {
  /// Read a scalar entry from the free-form config map. Numbers are
  /// returned in their decimal form, so a board id stored as `12345` reads
  /// the same as `"12345"`.
  pub fn config_str(&self, key: &str) -> Option<String> {
    let text = match self.config.get(key)? {
      Value::String(s) => s.trim().to_string(),
      Value::Number(n) => n.to_string(),
      _ => return None,
    };
    (!text.is_empty()).then_some(text)
  }

  /// Build the adapter creation config from the stored columns and config map.
  ///
  /// The stored `api_key` doubles as the token for every service unless the
  /// config map names a service-specific one.
  pub fn adapter_config(&self) -> Map<String, Value> {
    let mut out = Map::new();
    let mut put = |key: &str, value: Option<String>| {
      if let Some(v) = value {
        out.insert(key.to_string(), Value::String(v));
      }
    };
    put("api_token", self.api_key.clone());
    put(
      "api_key",
      self.config_str("api_key").or_else(|| self.api_key.clone()),
    );
    put("token", self.config_str("token").or_else(|| self.api_key.clone()));
    put("server", self.api_url.clone());
    put("api_url", self.api_url.clone());
    put("username", self.username.clone());
    for key in ["repository", "project_key", "board_id", "story_points_field"] {
      put(key, self.config_str(key));
    }
    out
  }
}

/// Parameters of a metrics request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricParams {
  #[serde(default = "default_days")]
  pub days: u32,
  #[serde(default)]
  pub project_key: Option<String>,
  #[serde(default)]
  pub board_id: Option<String>,
}

fn default_days() -> u32 {
  DEFAULT_DAYS
}

impl Default for MetricParams {
  fn default() -> Self {
    Self {
      days: DEFAULT_DAYS,
      project_key: None,
      board_id: None,
    }
  }
}

impl MetricParams {
  pub fn with_days(days: u32) -> Self {
    Self {
      days,
      ..Self::default()
    }
  }

  /// Fill locators the request left out from the integration's stored config.
  pub fn resolved_for(&self, integration: &Integration) -> Self {
    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    Self {
      days: self.days,
      project_key: non_empty(&self.project_key)
        .or_else(|| integration.config_str("project_key")),
      board_id: non_empty(&self.board_id)
        .or_else(|| integration.config_str("board_id")),
    }
  }
}

/// Flat metric name to value mapping.
///
/// Keys are kept sorted so that serializing the same metrics always yields the
/// same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, Value>);

impl Metrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Result reporting a failed computation.
  pub fn failed(message: impl Into<String>) -> Self {
    let mut m = Self::new();
    m.insert("error", true);
    m.insert("message", message.into());
    m
  }

  pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
    self.0.insert(key.to_string(), value.into());
  }

  #[cfg(test)]
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  #[cfg(test)]
  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Whether this result reports an error instead of metrics.
  pub fn is_error(&self) -> bool {
    match self.0.get("error") {
      Some(Value::Bool(b)) => *b,
      Some(Value::Null) | None => false,
      Some(_) => true,
    }
  }

  pub fn error_message(&self) -> Option<&str> {
    if !self.is_error() {
      return None;
    }
    self
      .0
      .get("message")
      .or_else(|| self.0.get("error"))
      .and_then(Value::as_str)
  }

  pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(self)
  }

  pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
    serde_json::from_slice(bytes)
  }
}

/// The metrics body of an envelope: either metrics or a single error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeBody {
  Error { error: String },
  Metrics(Metrics),
}

/// What callers outside the core receive for one integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEnvelope {
  pub integration_id: i64,
  pub integration_name: String,
  pub integration_type: String,
  pub metrics: EnvelopeBody,
}

impl MetricsEnvelope {
  pub fn ok(integration: &Integration, metrics: Metrics) -> Self {
    Self {
      integration_id: integration.id,
      integration_name: integration.name.clone(),
      integration_type: integration.kind.clone(),
      metrics: EnvelopeBody::Metrics(metrics),
    }
  }

  pub fn error(integration: &Integration, message: impl Into<String>) -> Self {
    Self {
      integration_id: integration.id,
      integration_name: integration.name.clone(),
      integration_type: integration.kind.clone(),
      metrics: EnvelopeBody::Error {
        error: message.into(),
      },
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self.metrics, EnvelopeBody::Error { .. })
  }
}

#[cfg(test)]
pub(crate) fn test_integration(id: i64, kind: &str, config: Value) -> Integration {
  Integration {
    id,
    name: format!("{} #{}", kind, id),
    kind: kind.to_string(),
    api_key: Some("secret".to_string()),
    api_url: None,
    username: Some("bot@example.com".to_string()),
    config: config.as_object().cloned().unwrap_or_default(),
    active: true,
    last_sync: None,
    owner: Owner {
      project_id: Some(1),
      team_id: None,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_metrics_serialize_with_sorted_keys() {
    let mut m = Metrics::new();
    m.insert("pr_count", 3);
    m.insert("commit_count", 1);
    assert_eq!(
      String::from_utf8(m.to_bytes().unwrap()).unwrap(),
      r#"{"commit_count":1,"pr_count":3}"#
    );
  }

  #[test]
  fn test_error_detection() {
    assert!(Metrics::failed("boom").is_error());
    assert_eq!(Metrics::failed("boom").error_message(), Some("boom"));

    let mut m = Metrics::new();
    m.insert("error", false);
    assert!(!m.is_error());
  }

  #[test]
  fn test_params_default_days() {
    let params: MetricParams = serde_json::from_value(json!({"board_id": "b1"})).unwrap();
    assert_eq!(params.days, DEFAULT_DAYS);
    assert_eq!(params.board_id.as_deref(), Some("b1"));
  }

  #[test]
  fn test_params_fall_back_to_stored_locator() {
    let integration = test_integration(1, "jira", json!({"project_key": "OPS"}));
    let resolved = MetricParams::default().resolved_for(&integration);
    assert_eq!(resolved.project_key.as_deref(), Some("OPS"));

    let explicit = MetricParams {
      project_key: Some("WEB".to_string()),
      ..MetricParams::default()
    };
    assert_eq!(
      explicit.resolved_for(&integration).project_key.as_deref(),
      Some("WEB")
    );
  }

  #[test]
  fn test_numeric_locators_are_read_as_text() {
    let integration = test_integration(3, "trello", json!({"board_id": 12345, "project_key": ["x"]}));
    assert_eq!(integration.config_str("board_id").as_deref(), Some("12345"));
    assert_eq!(integration.config_str("project_key"), None);
    assert_eq!(integration.adapter_config()["board_id"], json!("12345"));
  }

  #[test]
  fn test_adapter_config_reuses_api_key() {
    let integration = test_integration(7, "github", json!({"repository": "acme/app"}));
    let config = integration.adapter_config();
    assert_eq!(config["api_token"], json!("secret"));
    assert_eq!(config["token"], json!("secret"));
    assert_eq!(config["repository"], json!("acme/app"));
    assert!(!config.contains_key("server"));
  }

  #[test]
  fn test_envelope_error_shape() {
    let integration = test_integration(2, "trello", json!({}));
    let env = MetricsEnvelope::error(&integration, "Board ID not provided");
    let value = serde_json::to_value(&env).unwrap();
    assert_eq!(value["metrics"], json!({"error": "Board ID not provided"}));
    assert_eq!(value["integration_type"], json!("trello"));
  }
}
