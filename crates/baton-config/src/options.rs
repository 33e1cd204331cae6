use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Options forwarded to a flow runner when a flow run is executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
  /// Context entries layered over the ambient context for this run.
  #[serde(default)]
  pub context: Context,
  /// Executor the runner should use. Defaults to the flow's own executor.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor: Option<String>,
  /// Flow parameter overrides.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl RunOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_context(mut self, context: Context) -> Self {
    self.context = context;
    self
  }

  pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
    self.executor = Some(executor.into());
    self
  }
}
