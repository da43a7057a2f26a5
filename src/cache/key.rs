//! Cache key derivation for adapter calls.

use serde_json::{Map, Value};
use std::fmt;

use crate::adapters::AdapterKind;

/// Parameter name carrying the lookback window.
const DAYS_PARAM: &str = "days";
/// Suffix scoping a key to a non-default upstream host.
const HOST_PARAM: &str = "host";

/// Stable, delimiter-joined key for one adapter call.
///
/// Only the kind's identity parameter and `days` take part in the key, in that
/// order, so incidental call-site parameters never fragment the cache. A
/// self-hosted upstream adds its host at the end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  /// Build the key for `operation` on an adapter of `kind`.
  ///
  /// `identity` is the adapter's locator when the caller has it at hand; it
  /// takes precedence over the same parameter passed in `params`.
  pub fn for_call(
    kind: AdapterKind,
    operation: &str,
    identity: Option<&str>,
    params: &Map<String, Value>,
  ) -> Self {
    let mut parts: Vec<String> = vec![kind.tag().to_string(), operation.to_string()];

    let identity_param = kind.identity_param();
    let identity = identity
      .filter(|s| !s.is_empty())
      .map(String::from)
      .or_else(|| params.get(identity_param).and_then(stringify));
    if let Some(value) = identity {
      parts.push(identity_param.to_string());
      parts.push(value);
    }

    if let Some(days) = params.get(DAYS_PARAM).and_then(stringify) {
      parts.push(DAYS_PARAM.to_string());
      parts.push(days);
    }

    Self(parts.join(":"))
  }

  /// Key for a metrics computation over `days`.
  pub fn for_metrics(kind: AdapterKind, identity: &str, days: u32) -> Self {
    let mut params = Map::new();
    params.insert(DAYS_PARAM.to_string(), Value::from(days));
    Self::for_call(kind, METRICS_OPERATION, Some(identity), &params)
  }

  /// Scope the key to the upstream `host`. Keys for the service's public
  /// endpoint carry no host.
  pub fn on_host(self, host: Option<&str>) -> Self {
    match host.map(str::trim).filter(|h| !h.is_empty()) {
      Some(host) => Self(format!("{}:{}:{}", self.0, HOST_PARAM, host)),
      None => self,
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// Operation name used for metric computations.
pub const METRICS_OPERATION: &str = "calculate_metrics";

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Render a parameter value. Nulls and empty strings count as absent.
fn stringify(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) if s.is_empty() => None,
    Value::String(s) => Some(s.clone()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    // serde_json maps are ordered by key, so this is deterministic.
    Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
  }

  #[test]
  fn test_key_format() {
    let key = CacheKey::for_metrics(AdapterKind::SourceControl, "acme/app", 30);
    assert_eq!(
      key.as_str(),
      "github:calculate_metrics:repository:acme/app:days:30"
    );
  }

  #[test]
  fn test_host_scoping() {
    let public = CacheKey::for_metrics(AdapterKind::IssueTracker, "OPS", 30);
    assert_eq!(public.clone().on_host(None), public);
    assert_eq!(public.clone().on_host(Some(" ")), public);
    assert_eq!(
      public.on_host(Some("acme.atlassian.net")).as_str(),
      "jira:calculate_metrics:project_key:OPS:days:30:host:acme.atlassian.net"
    );
  }

  #[test]
  fn test_positional_and_keyword_identity_match() {
    let positional = CacheKey::for_call(
      AdapterKind::Board,
      METRICS_OPERATION,
      Some("b-42"),
      &params(json!({"days": 14})),
    );
    let keyword = CacheKey::for_call(
      AdapterKind::Board,
      METRICS_OPERATION,
      None,
      &params(json!({"board_id": "b-42", "days": 14})),
    );
    assert_eq!(positional, keyword);
  }

  #[test]
  fn test_unrecognized_params_are_ignored() {
    let plain = CacheKey::for_call(
      AdapterKind::IssueTracker,
      METRICS_OPERATION,
      None,
      &params(json!({"project_key": "OPS", "days": 7})),
    );
    let noisy = CacheKey::for_call(
      AdapterKind::IssueTracker,
      METRICS_OPERATION,
      None,
      &params(json!({
        "project_key": "OPS",
        "days": 7,
        "board_id": "ignored-for-jira",
        "request_id": "abc",
        "verbose": true
      })),
    );
    assert_eq!(plain, noisy);
    assert_eq!(
      plain.as_str(),
      "jira:calculate_metrics:project_key:OPS:days:7"
    );
  }

  #[test]
  fn test_missing_params_are_omitted() {
    let key = CacheKey::for_call(
      AdapterKind::IssueTracker,
      METRICS_OPERATION,
      None,
      &params(json!({"days": null, "project_key": ""})),
    );
    assert_eq!(key.as_str(), "jira:calculate_metrics");
  }

  #[test]
  fn test_days_as_string_or_number_agree() {
    let number = CacheKey::for_call(
      AdapterKind::SourceControl,
      METRICS_OPERATION,
      Some("acme/app"),
      &params(json!({"days": 30})),
    );
    let text = CacheKey::for_call(
      AdapterKind::SourceControl,
      METRICS_OPERATION,
      Some("acme/app"),
      &params(json!({"days": "30"})),
    );
    assert_eq!(number, text);
  }

  #[test]
  fn test_key_is_pure() {
    let p = params(json!({"days": 90, "board_id": "x"}));
    let a = CacheKey::for_call(AdapterKind::Board, "op", None, &p);
    let b = CacheKey::for_call(AdapterKind::Board, "op", None, &p);
    assert_eq!(a, b);
  }
}
