//! Collaborators the executor drives.
//!
//! Each trait is implemented outside this crate: a secrets backend, a flow
//! storage backend, and the engine that runs a flow's task graph.
//!
//! Any collaborator may report a user interrupt by returning a boxed
//! [`ExecutionError::Interrupted`](crate::ExecutionError::Interrupted); it is
//! then recorded as a cancellation rather than a failure.

use std::sync::Arc;

use async_trait::async_trait;
use baton_config::{Context, RunOptions, StorageRef};
use baton_store::State;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// Resolves secrets by name.
#[async_trait]
pub trait SecretProvider: Send + Sync {
  async fn get_secret(&self, name: &str, context: &Context) -> Result<serde_json::Value, BoxError>;
}

/// Loads a flow definition from storage.
#[async_trait]
pub trait FlowLoader: Send + Sync {
  /// `context` carries the resolved secrets and `loading_flow = true`.
  async fn load_flow(
    &self,
    storage: &StorageRef,
    flow_name: &str,
    context: &Context,
  ) -> Result<Flow, BoxError>;
}

/// Executes a flow's task graph to completion.
#[async_trait]
pub trait FlowRunner: Send + Sync {
  /// Name used in logs.
  fn name(&self) -> &str;

  /// Run the flow and return its final state.
  ///
  /// The executor awaits the runner after `cancel` fires. A runner that
  /// stops because of it should return a boxed
  /// [`ExecutionError::Interrupted`](crate::ExecutionError::Interrupted).
  async fn run(
    &self,
    flow: &Flow,
    options: RunOptions,
    cancel: CancellationToken,
  ) -> Result<State, BoxError>;
}

/// Legacy execution environment, used for flow runs without a run config.
#[async_trait]
pub trait Environment: Send + Sync {
  async fn setup(&self, flow: &Flow) -> Result<(), BoxError>;

  async fn execute(&self, flow: &Flow) -> Result<(), BoxError>;
}

/// A loaded flow definition.
#[derive(Clone, Default)]
pub struct Flow {
  pub name: String,
  /// Executor configured on the flow, used when the caller names none.
  pub executor: Option<String>,
  pub environment: Option<Arc<dyn Environment>>,
  /// Engine-specific graph definition.
  pub definition: serde_json::Value,
}

impl Flow {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
    self.executor = Some(executor.into());
    self
  }

  pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
    self.environment = Some(environment);
    self
  }

  pub fn with_definition(mut self, definition: serde_json::Value) -> Self {
    self.definition = definition;
    self
  }
}

impl std::fmt::Debug for Flow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Flow")
      .field("name", &self.name)
      .field("executor", &self.executor)
      .field("has_environment", &self.environment.is_some())
      .field("definition", &self.definition)
      .finish()
  }
}
