use serde::{Deserialize, Serialize};

/// Reference to the storage a flow definition was registered with.
///
/// The reference is opaque to baton: only the loader understands `kind`,
/// `location` and `settings`. The declared `secrets` are resolved before the
/// flow is loaded so that storage backends needing credentials can use them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRef {
  /// Storage backend name (e.g. "local", "s3", "docker").
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  /// Names of secrets the storage needs resolved before loading.
  #[serde(default)]
  pub secrets: Vec<String>,
  /// Backend-specific settings.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub settings: serde_json::Map<String, serde_json::Value>,
}

impl StorageRef {
  pub fn new(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      location: None,
      secrets: Vec::new(),
      settings: serde_json::Map::new(),
    }
  }

  pub fn with_location(mut self, location: impl Into<String>) -> Self {
    self.location = Some(location.into());
    self
  }

  pub fn with_secret(mut self, name: impl Into<String>) -> Self {
    self.secrets.push(name.into());
    self
  }
}

impl std::fmt::Display for StorageRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.location {
      Some(location) => write!(f, "{}({})", self.kind, location),
      None => write!(f, "{}", self.kind),
    }
  }
}
