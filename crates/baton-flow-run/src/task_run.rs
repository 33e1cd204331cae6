//! Task runs and task run lookups.

use baton_store::{State, Store, TaskRunData, TaskRunFilter, UNMAPPED_INDEX};
use serde::{Deserialize, Serialize};

use crate::error::FlowRunError;

/// A snapshot of one task execution attempt within a flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
  pub task_run_id: String,
  pub task_id: String,
  pub task_slug: String,
  pub flow_run_id: String,
  pub name: Option<String>,
  /// `-1` for unmapped tasks and for the base record of a mapped task.
  pub map_index: i64,
  pub state: State,
}

impl TaskRun {
  /// Whether this record is one element of a mapped task.
  pub fn is_mapped_element(&self) -> bool {
    self.map_index >= 0
  }

  /// Load a task run by ID.
  pub async fn from_task_run_id(store: &dyn Store, task_run_id: &str) -> Result<Self, FlowRunError> {
    Ok(store.get_task_run(task_run_id).await?.into())
  }

  /// Load the task run for `task_slug` at `map_index` within a flow run.
  pub async fn from_task_slug(
    store: &dyn Store,
    task_slug: &str,
    flow_run_id: &str,
    map_index: i64,
  ) -> Result<Self, FlowRunError> {
    let filter = TaskRunFilter::for_flow_run(flow_run_id)
      .task_slug(task_slug)
      .map_index(map_index);

    store
      .find_task_run(&filter, true)
      .await?
      .map(TaskRun::from)
      .ok_or_else(|| baton_store::Error::NotFound(format!("task run matching {}", filter)).into())
  }
}

impl From<TaskRunData> for TaskRun {
  fn from(data: TaskRunData) -> Self {
    Self {
      task_run_id: data.task_run_id,
      task_id: data.task_id,
      task_slug: data.task_slug,
      flow_run_id: data.flow_run_id,
      name: data.name,
      map_index: data.map_index,
      state: data.state,
    }
  }
}

impl std::fmt::Display for TaskRun {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "TaskRun(task_run_id={}, task_slug={}", self.task_run_id, self.task_slug)?;
    if self.map_index != UNMAPPED_INDEX {
      write!(f, ", map_index={}", self.map_index)?;
    }
    write!(f, ", state={})", self.state)
  }
}

/// Identity of a task within a flow definition.
///
/// The slug is assigned when the flow is registered; tasks of a flow that
/// was never registered have none and cannot be used for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub name: String,
  #[serde(default)]
  pub slug: Option<String>,
}

impl Task {
  pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      slug: Some(slug.into()),
    }
  }

  pub fn unregistered(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      slug: None,
    }
  }
}

/// Identifies a task run within a flow run.
///
/// Any combination of task, slug and task run ID may be given; they must
/// agree with each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRunQuery {
  pub task: Option<Task>,
  pub task_slug: Option<String>,
  pub task_run_id: Option<String>,
}

impl TaskRunQuery {
  pub fn by_id(task_run_id: impl Into<String>) -> Self {
    Self {
      task_run_id: Some(task_run_id.into()),
      ..Self::default()
    }
  }

  pub fn by_slug(task_slug: impl Into<String>) -> Self {
    Self {
      task_slug: Some(task_slug.into()),
      ..Self::default()
    }
  }

  pub fn for_task(task: &Task) -> Self {
    Self {
      task: Some(task.clone()),
      ..Self::default()
    }
  }

  pub fn with_task(mut self, task: &Task) -> Self {
    self.task = Some(task.clone());
    self
  }

  pub fn with_slug(mut self, task_slug: impl Into<String>) -> Self {
    self.task_slug = Some(task_slug.into());
    self
  }

  pub fn with_id(mut self, task_run_id: impl Into<String>) -> Self {
    self.task_run_id = Some(task_run_id.into());
    self
  }

  /// The slug this query refers to, taken from the explicit slug or the task.
  pub(crate) fn resolve_slug(&self) -> Result<Option<String>, FlowRunError> {
    let Some(task) = &self.task else {
      return Ok(self.task_slug.clone());
    };

    if task.slug.is_none() && self.task_slug.is_none() {
      return Err(FlowRunError::invalid_argument(format!(
        "task '{}' does not have a slug set and cannot be used for lookups; \
         this generally occurs when the flow has not been registered",
        task.name
      )));
    }

    if let Some(task_slug) = &self.task_slug {
      if task.slug.as_deref() != Some(task_slug.as_str()) {
        return Err(FlowRunError::invalid_argument(format!(
          "both a task and a task slug were provided but they contain different slug values: \
           task slug {:?}, given slug {:?}",
          task.slug, task_slug
        )));
      }
    }

    Ok(self.task_slug.clone().or_else(|| task.slug.clone()))
  }
}
