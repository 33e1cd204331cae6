use baton_config::StorageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::State;

/// Map index of a task run that is not an element of a mapped task.
///
/// A mapped task also has one record at this index: the base record whose
/// state summarizes the whole family.
pub const UNMAPPED_INDEX: i64 = -1;

/// A flow run's head-of-line record as held by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRunData {
  pub flow_run_id: String,
  pub name: String,
  pub flow_id: String,
  pub flow_name: String,
  pub state: State,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub storage: Option<StorageRef>,
  /// Run configuration. Absent for flows registered with a legacy environment.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_config: Option<serde_json::Value>,
}

/// A task run as held by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunData {
  pub task_run_id: String,
  pub flow_run_id: String,
  pub task_id: String,
  /// Shared by every element of a mapped task.
  pub task_slug: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default = "default_map_index")]
  pub map_index: i64,
  pub state: State,
}

fn default_map_index() -> i64 {
  UNMAPPED_INDEX
}

/// Filter for task run queries. Unset fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunFilter {
  pub flow_run_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_slug: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub map_index: Option<i64>,
}

impl TaskRunFilter {
  pub fn for_flow_run(flow_run_id: impl Into<String>) -> Self {
    Self {
      flow_run_id: flow_run_id.into(),
      task_slug: None,
      map_index: None,
    }
  }

  pub fn task_slug(mut self, task_slug: impl Into<String>) -> Self {
    self.task_slug = Some(task_slug.into());
    self
  }

  pub fn map_index(mut self, map_index: i64) -> Self {
    self.map_index = Some(map_index);
    self
  }

  pub fn matches(&self, task_run: &TaskRunData) -> bool {
    task_run.flow_run_id == self.flow_run_id
      && self
        .task_slug
        .as_ref()
        .is_none_or(|slug| *slug == task_run.task_slug)
      && self
        .map_index
        .is_none_or(|index| index == task_run.map_index)
  }
}

impl std::fmt::Display for TaskRunFilter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "flow_run_id={}", self.flow_run_id)?;
    if let Some(slug) = &self.task_slug {
      write!(f, ", task_slug={}", slug)?;
    }
    if let Some(index) = self.map_index {
      write!(f, ", map_index={}", index)?;
    }
    Ok(())
  }
}

/// Severity of a run-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
  Debug,
  Info,
  Warning,
  Error,
  Critical,
}

/// A structured entry in a flow run's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
  pub flow_run_id: String,
  /// Logger name of the component that wrote the entry.
  pub name: String,
  pub message: String,
  pub level: LogLevel,
  pub timestamp: DateTime<Utc>,
}

impl RunLog {
  pub fn new(
    flow_run_id: impl Into<String>,
    name: impl Into<String>,
    message: impl Into<String>,
    level: LogLevel,
  ) -> Self {
    Self {
      flow_run_id: flow_run_id.into(),
      name: name.into(),
      message: message.into(),
      level,
      timestamp: Utc::now(),
    }
  }
}
