//! Flow run execution.

use std::sync::Arc;

use baton_config::{Context, RunOptions};
use baton_flow_run::{FlowRun, FlowRunError, LoadOptions};
use baton_store::Store;
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::context::merge_run_options;
use crate::error::{BoxError, ExecutionError};
use crate::guard::{ExecutionGuard, FailureMessage};
use crate::traits::{Flow, FlowLoader, FlowRunner, SecretProvider};

const SECRET_TEMPLATE: &str = "Failed to load flow secret {{ secret | tojson }}: {{ error }}";
const FLOW_LOAD_TEMPLATE: &str = "Failed to load flow from storage: {{ error }}";
const EXECUTE_TEMPLATE: &str = "Failed to execute flow: {{ error }}";

/// Executes flow runs with the given collaborators.
///
/// Every stage after the flow run is loaded runs under an
/// [`ExecutionGuard`], so a failure marks the run `Failed` and an interrupt
/// marks it `Cancelled`.
pub struct FlowRunExecutor {
  store: Arc<dyn Store>,
  secrets: Arc<dyn SecretProvider>,
  loader: Arc<dyn FlowLoader>,
  runner: Arc<dyn FlowRunner>,
  /// Ambient context. Its secrets seed the secrets of every run.
  context: Context,
}

impl FlowRunExecutor {
  pub fn new(
    store: Arc<dyn Store>,
    secrets: Arc<dyn SecretProvider>,
    loader: Arc<dyn FlowLoader>,
    runner: Arc<dyn FlowRunner>,
  ) -> Self {
    Self {
      store,
      secrets,
      loader,
      runner,
      context: Context::new(),
    }
  }

  pub fn with_context(mut self, context: Context) -> Self {
    self.context = context;
    self
  }

  /// Execute a flow run.
  ///
  /// `flow` skips loading from storage when given. `options` is not
  /// modified; the runner receives a merged copy. Returns the flow run
  /// re-read after execution.
  #[instrument(
    name = "execute_flow_run",
    skip(self, flow, options, cancel),
    fields(flow_run_id = %flow_run_id)
  )]
  pub async fn execute(
    &self,
    flow_run_id: &str,
    flow: Option<Flow>,
    options: &RunOptions,
    cancel: CancellationToken,
  ) -> Result<FlowRun, ExecutionError> {
    let flow_run =
      FlowRun::from_flow_run_id(self.store.clone(), flow_run_id, LoadOptions::default()).await?;

    if flow_run.state.is_running() {
      return Err(
        FlowRunError::AlreadyRunning {
          flow_run_id: flow_run_id.to_string(),
        }
        .into(),
      );
    }

    let guard = ExecutionGuard::new(self.store.clone(), flow_run_id, cancel.clone());

    let secret_names = flow_run
      .storage
      .as_ref()
      .map(|storage| storage.secrets.clone())
      .unwrap_or_default();

    info!(
      flow_run_id = %flow_run_id,
      secrets = secret_names.len(),
      "loading_secrets"
    );

    let mut storage_secrets = Map::new();
    for name in &secret_names {
      let message = FailureMessage::new(SECRET_TEMPLATE).with_var("secret", name.as_str());
      let value = guard
        .run_guarded(&message, async {
          self
            .secrets
            .get_secret(name, &self.context)
            .await
            .map_err(|source| {
              ExecutionError::from_collaborator(source, |source| ExecutionError::Secret {
                name: name.clone(),
                source,
              })
            })
        })
        .await?;
      storage_secrets.insert(name.clone(), value);
    }

    let flow = match flow {
      Some(flow) => flow,
      None => {
        info!(flow_run_id = %flow_run_id, flow_name = %flow_run.flow_name, "loading_flow");

        let mut load_context = self.context.clone();
        let mut secrets = self.context.secrets();
        secrets.extend(storage_secrets.clone());
        load_context.set_secrets(secrets);
        load_context.insert("loading_flow", true);

        guard
          .run_guarded(&FailureMessage::new(FLOW_LOAD_TEMPLATE), async {
            let storage = flow_run.storage.as_ref().ok_or_else(|| {
              FlowRunError::invalid_argument(format!(
                "flow run '{}' has no storage and no flow was provided",
                flow_run_id
              ))
            })?;
            self
              .loader
              .load_flow(storage, &flow_run.flow_name, &load_context)
              .await
              .map_err(|source| {
                ExecutionError::from_collaborator(source, |source| ExecutionError::FlowLoad {
                  source,
                })
              })
          })
          .await?
      }
    };

    let mut run_options = merge_run_options(&self.context, &storage_secrets, options, flow_run_id)?;
    if run_options.executor.is_none() {
      run_options.executor = flow.executor.clone();
    }

    let execute_message = FailureMessage::new(EXECUTE_TEMPLATE);
    if flow_run.run_config.is_some() {
      info!(
        flow_run_id = %flow_run_id,
        runner = %self.runner.name(),
        executor = run_options.executor.as_deref().unwrap_or("default"),
        "executing_flow"
      );

      // The runner watches the token and is awaited through its cleanup.
      let state = guard
        .run_cooperative(&execute_message, async {
          self
            .runner
            .run(&flow, run_options, cancel.child_token())
            .await
            .map_err(ExecutionError::from_runner)
        })
        .await?;
      info!(flow_run_id = %flow_run_id, state = %state, "flow_runner_returned");
    } else {
      guard
        .run_guarded(&execute_message, async {
          let environment = flow.environment.as_ref().ok_or_else(|| {
            FlowRunError::invalid_operation(format!(
              "flow run '{}' has no run config and flow '{}' has no environment",
              flow_run_id, flow.name
            ))
          })?;

          info!(flow_run_id = %flow_run_id, runner = "environment", "executing_flow");
          environment
            .setup(&flow)
            .await
            .map_err(environment_error)?;
          environment
            .execute(&flow)
            .await
            .map_err(environment_error)
        })
        .await?;
    }

    let flow_run = flow_run.update().await?;

    info!(
      flow_run_id = %flow_run_id,
      state = %flow_run.state,
      "flow_run_finished"
    );

    Ok(flow_run)
  }
}

fn environment_error(source: BoxError) -> ExecutionError {
  ExecutionError::from_collaborator(source, |source| ExecutionError::Environment { source })
}

/// Execute a flow run, loading its flow from storage.
///
/// Shorthand for [`FlowRunExecutor::execute`] with no pre-built flow and a
/// token that is never cancelled.
pub async fn execute_flow_run(
  executor: &FlowRunExecutor,
  flow_run_id: &str,
  options: &RunOptions,
) -> Result<FlowRun, ExecutionError> {
  executor
    .execute(flow_run_id, None, options, CancellationToken::new())
    .await
}
