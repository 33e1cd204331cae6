//! Baton Store
//!
//! This crate provides the interface baton uses to talk to the remote control
//! plane, plus an in-memory implementation for tests and local inspection.
//!
//! The [`Store`] trait defines operations for:
//! - Reading a flow run's head-of-line record
//! - Reading task runs by id, by filter, or in bulk for a flow run
//! - Moving a flow run to a new state
//! - Appending run-log entries
//!
//! Transport, retries and timeouts belong to the implementation; callers see
//! each call as a single suspension point.

mod memory;
mod state;
mod types;

pub use memory::{MemoryStore, StoreCalls, StoreSnapshot};
pub use state::{State, StateKind};
pub use types::{FlowRunData, LogLevel, RunLog, TaskRunData, TaskRunFilter, UNMAPPED_INDEX};

use async_trait::async_trait;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The remote store could not be reached or rejected the request.
  #[error("store unavailable: {message}")]
  Unavailable { message: String },

  /// A record could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Reading a local snapshot failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn unavailable(message: impl Into<String>) -> Self {
    Self::Unavailable {
      message: message.into(),
    }
  }
}

/// Storage trait for flow runs and task runs held by the control plane.
#[async_trait]
pub trait Store: Send + Sync {
  /// Get a flow run's head-of-line record by ID.
  async fn get_flow_run(&self, flow_run_id: &str) -> Result<FlowRunData, Error>;

  /// Get a task run by ID.
  async fn get_task_run(&self, task_run_id: &str) -> Result<TaskRunData, Error>;

  /// Get the single task run matching `filter`.
  ///
  /// When nothing matches, returns `Ok(None)` unless `error_on_empty` is set,
  /// in which case [`Error::NotFound`] is returned.
  async fn find_task_run(
    &self,
    filter: &TaskRunFilter,
    error_on_empty: bool,
  ) -> Result<Option<TaskRunData>, Error>;

  /// List every task run matching `filter` in one query.
  async fn list_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRunData>, Error>;

  /// List the IDs of all task runs belonging to a flow run.
  async fn list_task_run_ids(&self, flow_run_id: &str) -> Result<Vec<String>, Error>;

  /// Set the state of a flow run.
  async fn set_flow_run_state(&self, flow_run_id: &str, state: State) -> Result<(), Error>;

  /// Append entries to the run log.
  async fn write_run_logs(&self, logs: Vec<RunLog>) -> Result<(), Error>;
}
