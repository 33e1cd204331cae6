//! Flow run errors.

/// Errors that can occur while looking up or operating on a flow run.
#[derive(Debug, thiserror::Error)]
pub enum FlowRunError {
  /// Conflicting or missing identifiers were passed to a lookup.
  #[error("invalid argument: {message}")]
  InvalidArgument { message: String },

  /// The task run's state does not allow the requested operation.
  #[error("invalid operation: {message}")]
  InvalidOperation { message: String },

  /// Execution was requested for a flow run that is already running.
  #[error("flow run '{flow_run_id}' is already in a running state")]
  AlreadyRunning { flow_run_id: String },

  /// A bulk load would exceed the task run cap.
  #[error(
    "refusing to load all task runs for a flow run with {count} task runs (limit {limit}); \
     load the task runs you are interested in individually"
  )]
  ResourceLimitExceeded { count: usize, limit: usize },

  /// The remote store failed.
  #[error(transparent)]
  Store(#[from] baton_store::Error),
}

impl FlowRunError {
  pub fn invalid_argument(message: impl Into<String>) -> Self {
    Self::InvalidArgument {
      message: message.into(),
    }
  }

  pub fn invalid_operation(message: impl Into<String>) -> Self {
    Self::InvalidOperation {
      message: message.into(),
    }
  }
}
