//! Scoped failure handling for one stage of a flow run.
//!
//! [`ExecutionGuard::run_guarded`] runs a unit of work. If the work fails or
//! is interrupted while the flow run is still running remotely, the run is
//! moved to a terminal state. The original error is always returned.
//!
//! The remote state is read and then written in two separate calls. Another
//! actor may move the run between them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use baton_store::{LogLevel, RunLog, State, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::ExecutionError;

/// Run-log source name for guard diagnostics.
pub const RUN_LOG_NAME: &str = "baton.executor.execute_flow_run";

/// State message written when execution is interrupted.
pub const INTERRUPT_MESSAGE: &str = "Keyboard interrupt.";

/// Template used when a stage does not provide one.
pub const DEFAULT_FAILURE_TEMPLATE: &str = "Flow run failed with {{ error }}";

/// A minijinja template for the message written on failure.
///
/// The failing error's string form is bound as `error`. Other variables can
/// be bound with [`FailureMessage::with_var`].
#[derive(Debug, Clone, PartialEq)]
pub struct FailureMessage {
  template: String,
  vars: BTreeMap<String, serde_json::Value>,
}

impl Default for FailureMessage {
  fn default() -> Self {
    Self::new(DEFAULT_FAILURE_TEMPLATE)
  }
}

impl FailureMessage {
  pub fn new(template: impl Into<String>) -> Self {
    Self {
      template: template.into(),
      vars: BTreeMap::new(),
    }
  }

  pub fn with_var(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.vars.insert(key.into(), value.into());
    self
  }

  /// Render the message for `error`.
  ///
  /// A template that fails to render falls back to the raw template followed
  /// by the error.
  pub fn render(&self, error: &dyn std::fmt::Display) -> String {
    let error = error.to_string();
    let mut vars = self.vars.clone();
    vars.insert("error".to_string(), serde_json::Value::String(error.clone()));

    let env = minijinja::Environment::new();
    match env.render_str(&self.template, &vars) {
      Ok(message) => message,
      Err(e) => {
        warn!(template = %self.template, error = %e, "failure_message_render_failed");
        format!("{}: {}", self.template, error)
      }
    }
  }
}

/// Moves a flow run to a terminal state when guarded work fails.
pub struct ExecutionGuard {
  store: Arc<dyn Store>,
  flow_run_id: String,
  cancel: CancellationToken,
}

impl ExecutionGuard {
  pub fn new(store: Arc<dyn Store>, flow_run_id: impl Into<String>, cancel: CancellationToken) -> Self {
    Self {
      store,
      flow_run_id: flow_run_id.into(),
      cancel,
    }
  }

  /// Run `work`, marking the flow run terminal if it fails.
  ///
  /// A cancelled token stops the work and counts as an interrupt, as does an
  /// [`ExecutionError::Interrupted`] returned by the work. If the fresh remote
  /// state is running, an interrupt writes `Cancelled` and any other error
  /// writes `Failed` with the rendered `message` plus one ERROR run log.
  /// Failures on this path are logged and never replace the original error.
  pub async fn run_guarded<T, F>(&self, message: &FailureMessage, work: F) -> Result<T, ExecutionError>
  where
    F: Future<Output = Result<T, ExecutionError>>,
  {
    let result = tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(ExecutionError::Interrupted),
      result = work => result,
    };

    self.settle(message, result).await
  }

  /// Like [`run_guarded`](Self::run_guarded), for work that watches the
  /// cancellation token itself.
  ///
  /// The work is awaited to completion so it can clean up after the token
  /// fires. It reports the interrupt by returning
  /// [`ExecutionError::Interrupted`].
  pub async fn run_cooperative<T, F>(
    &self,
    message: &FailureMessage,
    work: F,
  ) -> Result<T, ExecutionError>
  where
    F: Future<Output = Result<T, ExecutionError>>,
  {
    let result = work.await;
    self.settle(message, result).await
  }

  async fn settle<T>(
    &self,
    message: &FailureMessage,
    result: Result<T, ExecutionError>,
  ) -> Result<T, ExecutionError> {
    let error = match result {
      Ok(value) => return Ok(value),
      Err(e) => e,
    };

    if !self.remote_state_is_running().await {
      return Err(error);
    }

    if error.is_interrupt() {
      self.mark_cancelled().await;
    } else {
      self.mark_failed(message.render(&error)).await;
    }

    Err(error)
  }

  async fn remote_state_is_running(&self) -> bool {
    match self.store.get_flow_run(&self.flow_run_id).await {
      Ok(data) if data.state.is_running() => true,
      Ok(data) => {
        debug!(
          flow_run_id = %self.flow_run_id,
          state = %data.state,
          "guard_state_not_running"
        );
        false
      }
      Err(e) => {
        warn!(
          flow_run_id = %self.flow_run_id,
          error = %e,
          "guard_state_read_failed"
        );
        false
      }
    }
  }

  async fn mark_cancelled(&self) {
    let state = State::cancelled(INTERRUPT_MESSAGE);
    match self.store.set_flow_run_state(&self.flow_run_id, state).await {
      Ok(()) => warn!(flow_run_id = %self.flow_run_id, "guard_marked_cancelled"),
      Err(e) => warn!(
        flow_run_id = %self.flow_run_id,
        error = %e,
        "guard_cancel_write_failed"
      ),
    }
  }

  async fn mark_failed(&self, message: String) {
    error!(flow_run_id = %self.flow_run_id, message = %message, "guard_marked_failed");

    if let Err(e) = self
      .store
      .set_flow_run_state(&self.flow_run_id, State::failed(message.clone()))
      .await
    {
      warn!(
        flow_run_id = %self.flow_run_id,
        error = %e,
        "guard_fail_write_failed"
      );
    }

    let log = RunLog::new(&self.flow_run_id, RUN_LOG_NAME, message, LogLevel::Error);
    if let Err(e) = self.store.write_run_logs(vec![log]).await {
      warn!(
        flow_run_id = %self.flow_run_id,
        error = %e,
        "guard_log_write_failed"
      );
    }
  }
}
