//! Ambient execution context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which resolved secrets live in a [`Context`].
pub const SECRETS_KEY: &str = "secrets";

/// A JSON object carried alongside a flow run.
///
/// Holds arbitrary keys plus the reserved `secrets` mapping. Values are
/// owned, so cloning a context is a deep copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
  pub fn new() -> Self {
    Self(Map::new())
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    self.0.insert(key.into(), value.into())
  }

  /// Builder-style [`Context::insert`].
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(key, value);
    self
  }

  /// The raw `secrets` entry, if present.
  ///
  /// Returns the value as-is; callers decide how to treat a non-object.
  pub fn secrets_value(&self) -> Option<&Value> {
    self.0.get(SECRETS_KEY)
  }

  /// The `secrets` entry as an object, or an empty map when absent or not
  /// an object.
  pub fn secrets(&self) -> Map<String, Value> {
    match self.0.get(SECRETS_KEY) {
      Some(Value::Object(secrets)) => secrets.clone(),
      _ => Map::new(),
    }
  }

  pub fn set_secrets(&mut self, secrets: Map<String, Value>) {
    self.0.insert(SECRETS_KEY.to_string(), Value::Object(secrets));
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }
}

impl From<Map<String, Value>> for Context {
  fn from(map: Map<String, Value>) -> Self {
    Self(map)
  }
}
