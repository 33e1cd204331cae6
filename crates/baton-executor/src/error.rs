//! Execution errors.

use baton_flow_run::FlowRunError;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while executing a flow run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  #[error(transparent)]
  FlowRun(#[from] FlowRunError),

  /// A secret declared by the flow's storage could not be resolved.
  #[error("secret '{name}' could not be resolved: {source}")]
  Secret {
    name: String,
    #[source]
    source: BoxError,
  },

  /// The flow definition could not be loaded from storage.
  #[error("{source}")]
  FlowLoad {
    #[source]
    source: BoxError,
  },

  /// The flow runner failed before producing a final state.
  #[error("{source}")]
  Runner {
    #[source]
    source: BoxError,
  },

  /// The legacy environment failed during setup or execution.
  #[error("environment error: {source}")]
  Environment {
    #[source]
    source: BoxError,
  },

  /// Execution was interrupted by the user.
  #[error("execution interrupted")]
  Interrupted,
}

impl ExecutionError {
  /// Whether this error is a user interrupt rather than a failure.
  pub fn is_interrupt(&self) -> bool {
    matches!(self, Self::Interrupted)
  }

  /// Wrap an error returned by a collaborator.
  ///
  /// A collaborator that was interrupted may return a boxed
  /// [`ExecutionError::Interrupted`]; that value is unwrapped so the
  /// interrupt is seen as such. Any other error is passed to `wrap`.
  pub fn from_collaborator(source: BoxError, wrap: impl FnOnce(BoxError) -> Self) -> Self {
    match source.downcast::<ExecutionError>() {
      Ok(inner) => *inner,
      Err(source) => wrap(source),
    }
  }

  /// Wrap an error returned by a [`FlowRunner`](crate::FlowRunner).
  pub fn from_runner(source: BoxError) -> Self {
    Self::from_collaborator(source, |source| Self::Runner { source })
  }
}

impl From<baton_store::Error> for ExecutionError {
  fn from(e: baton_store::Error) -> Self {
    Self::FlowRun(FlowRunError::Store(e))
  }
}
