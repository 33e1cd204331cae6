//! Run option merging.

use baton_config::{Context, RunOptions};
use baton_flow_run::FlowRunError;
use serde_json::{Map, Value};

/// Build the run options handed to the flow runner.
///
/// The returned context is the ambient context overlaid with the caller's
/// context. Its `secrets` entry is the union of ambient, storage and caller
/// secrets, later sources winning on key collisions. `flow_run_id` is always
/// set. The caller's options are left untouched.
pub fn merge_run_options(
  ambient: &Context,
  storage_secrets: &Map<String, Value>,
  caller: &RunOptions,
  flow_run_id: &str,
) -> Result<RunOptions, FlowRunError> {
  let caller_secrets = match caller.context.secrets_value() {
    None => Map::new(),
    Some(Value::Object(secrets)) => secrets.clone(),
    Some(other) => {
      return Err(FlowRunError::invalid_argument(format!(
        "run options context secrets must be a mapping, got {}",
        other
      )));
    }
  };

  let mut secrets = ambient.secrets();
  secrets.extend(storage_secrets.clone());
  secrets.extend(caller_secrets);

  let mut context = ambient.clone();
  for (key, value) in caller.context.as_map() {
    context.insert(key.clone(), value.clone());
  }
  context.set_secrets(secrets);
  context.insert("flow_run_id", flow_run_id);

  Ok(RunOptions {
    context,
    ..caller.clone()
  })
}
