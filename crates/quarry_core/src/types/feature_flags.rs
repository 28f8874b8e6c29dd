use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureFlagValue {
  String(String),
  Bool(bool),
}

/// Feature flags are an explicit part of the build options, passed to every request
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FeatureFlags(pub HashMap<String, FeatureFlagValue>);

impl FeatureFlags {
  pub fn with_bool_flag(mut self, name: &str, value: bool) -> Self {
    self.0.insert(name.to_string(), FeatureFlagValue::Bool(value));
    self
  }

  pub fn bool_enabled_or(&self, name: &str, default: bool) -> bool {
    match self.0.get(name) {
      Some(FeatureFlagValue::Bool(value)) => *value,
      Some(FeatureFlagValue::String(value)) => value == "true",
      None => default,
    }
  }

  /// Deferral of dependencies whose imports are all unused
  pub fn defer_unused_dependencies(&self) -> bool {
    self.bool_enabled_or("deferUnusedDependencies", true)
  }

  /// Report imports of missing exports as errors rather than warnings
  pub fn strict_symbol_checks(&self) -> bool {
    self.bool_enabled_or("strictSymbolChecks", true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_flags_default_when_unset() {
    let flags = FeatureFlags::default();

    assert!(flags.defer_unused_dependencies());
    assert!(flags.strict_symbol_checks());
  }

  #[test]
  fn test_flags_read_bool_and_string_values() {
    let flags: FeatureFlags = serde_json::from_str(
      r#"{ "deferUnusedDependencies": false, "strictSymbolChecks": "false" }"#,
    )
    .unwrap();

    assert!(!flags.defer_unused_dependencies());
    assert!(!flags.strict_symbol_checks());
  }
}
