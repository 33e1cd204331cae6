//! Baton Executor
//!
//! Executes a flow run against the control plane and guarantees that an
//! uncaught failure or an interrupt leaves the run in a terminal state.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      FlowRunExecutor                       │
//! │  - loads the flow run, refuses runs already in progress    │
//! │  - resolves storage secrets           (guarded)            │
//! │  - loads the flow from storage        (guarded)            │
//! │  - merges run options with the context                     │
//! │  - dispatches to the FlowRunner       (guarded)            │
//! └──────────────────────────┬─────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ExecutionGuard                        │
//! │  - error:     re-read state, mark Failed, write a run log  │
//! │  - interrupt: re-read state, mark Cancelled                │
//! │  - the original error is always returned                   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let executor = FlowRunExecutor::new(store, secrets, loader, runner)
//!   .with_context(ambient);
//!
//! let cancel = CancellationToken::new();
//! let flow_run = executor
//!   .execute("flow-run-id", None, &RunOptions::default(), cancel)
//!   .await?;
//! println!("{}", flow_run.state);
//! ```

mod context;
mod error;
mod executor;
mod guard;
mod traits;

pub use context::merge_run_options;
pub use error::{BoxError, ExecutionError};
pub use executor::{FlowRunExecutor, execute_flow_run};
pub use guard::{
  DEFAULT_FAILURE_TEMPLATE, ExecutionGuard, FailureMessage, INTERRUPT_MESSAGE, RUN_LOG_NAME,
};
pub use traits::{Environment, Flow, FlowLoader, FlowRunner, SecretProvider};
