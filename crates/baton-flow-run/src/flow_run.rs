//! Flow run handle.

use std::collections::HashMap;
use std::sync::Arc;

use baton_config::StorageRef;
use baton_store::{FlowRunData, State, Store, TaskRunFilter, UNMAPPED_INDEX};
use tracing::{debug, info, instrument, warn};

use crate::cache::TaskRunCache;
use crate::error::FlowRunError;
use crate::mapped::MappedTaskRuns;
use crate::task_run::{TaskRun, TaskRunQuery};

/// Maximum number of task runs [`FlowRun::get_all`] will load in one query.
pub const MAX_BULK_TASK_RUNS: usize = 1000;

/// Options for [`FlowRun::from_flow_run_id`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
  /// Pre-populate the cache with every unmapped task run of the flow run.
  pub load_static_tasks: bool,
  /// Task runs already known to the caller, added to the cache as-is.
  pub task_runs: Vec<Arc<TaskRun>>,
}

impl Default for LoadOptions {
  fn default() -> Self {
    Self {
      load_static_tasks: true,
      task_runs: Vec::new(),
    }
  }
}

impl LoadOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn without_static_tasks(mut self) -> Self {
    self.load_static_tasks = false;
    self
  }

  pub fn with_task_runs<I, T>(mut self, task_runs: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Arc<TaskRun>>,
  {
    self.task_runs.extend(task_runs.into_iter().map(Into::into));
    self
  }
}

/// One execution of a registered flow, as seen by the client.
///
/// Owns a read-through [`TaskRunCache`]. Lookups that mutate the cache take
/// `&mut self`, so a flow run is used by one caller at a time.
pub struct FlowRun {
  pub flow_run_id: String,
  pub name: String,
  pub flow_id: String,
  pub flow_name: String,
  pub storage: Option<StorageRef>,
  /// Run configuration. `None` selects the legacy environment path.
  pub run_config: Option<serde_json::Value>,
  pub state: State,

  /// Only populated once the flow run has finished.
  task_run_ids: Option<Vec<String>>,
  cache: TaskRunCache,
  pub(crate) store: Arc<dyn Store>,
}

impl FlowRun {
  /// Build a flow run from a record that was already fetched.
  pub fn new<I>(store: Arc<dyn Store>, data: FlowRunData, task_runs: I) -> Self
  where
    I: IntoIterator<Item = Arc<TaskRun>>,
  {
    Self {
      flow_run_id: data.flow_run_id,
      name: data.name,
      flow_id: data.flow_id,
      flow_name: data.flow_name,
      storage: data.storage,
      run_config: data.run_config,
      state: data.state,
      task_run_ids: None,
      cache: task_runs.into_iter().collect(),
      store,
    }
  }

  /// Load a flow run by ID.
  #[instrument(name = "flow_run_load", skip(store, options), fields(flow_run_id = %flow_run_id))]
  pub async fn from_flow_run_id(
    store: Arc<dyn Store>,
    flow_run_id: &str,
    options: LoadOptions,
  ) -> Result<Self, FlowRunError> {
    let data = store.get_flow_run(flow_run_id).await?;

    let mut task_runs: Vec<Arc<TaskRun>> = if options.load_static_tasks {
      let filter = TaskRunFilter::for_flow_run(flow_run_id).map_index(UNMAPPED_INDEX);
      store
        .list_task_runs(&filter)
        .await?
        .into_iter()
        .map(|data| Arc::new(TaskRun::from(data)))
        .collect()
    } else {
      Vec::new()
    };
    task_runs.extend(options.task_runs);

    let flow_run = Self::new(store, data, task_runs);

    info!(
      flow_run_id = %flow_run.flow_run_id,
      flow_name = %flow_run.flow_name,
      state = %flow_run.state,
      cached_task_runs = flow_run.cache.len(),
      "flow_run_loaded"
    );

    Ok(flow_run)
  }

  /// Reload this flow run from the store.
  ///
  /// Static tasks are not re-queried; the current cache is carried over.
  pub async fn update(&self) -> Result<FlowRun, FlowRunError> {
    let options = LoadOptions::new()
      .without_static_tasks()
      .with_task_runs(self.cache.values().cloned());

    Self::from_flow_run_id(self.store.clone(), &self.flow_run_id, options).await
  }

  /// Cached task runs keyed by task run ID.
  pub fn task_runs(&self) -> &HashMap<String, Arc<TaskRun>> {
    self.cache.task_runs()
  }

  pub(crate) fn cache_mut(&mut self) -> &mut TaskRunCache {
    &mut self.cache
  }

  /// Get a task run of this flow run.
  ///
  /// A task run ID is answered from the cache when possible. A slug (given
  /// directly or through the task) is answered from the cache only when it
  /// names a mapped family whose base record is cached; otherwise the base
  /// record is queried. Every fetched task run is cached before returning.
  pub async fn get(&mut self, query: TaskRunQuery) -> Result<Arc<TaskRun>, FlowRunError> {
    let task_slug = query.resolve_slug()?;

    if let Some(task_run_id) = &query.task_run_id {
      let task_run = match self.cache.get(task_run_id) {
        Some(task_run) => task_run.clone(),
        None => {
          debug!(flow_run_id = %self.flow_run_id, task_run_id = %task_run_id, "task_run_cache_miss");
          Arc::new(TaskRun::from_task_run_id(self.store.as_ref(), task_run_id).await?)
        }
      };

      if let Some(task_slug) = &task_slug {
        if task_run.task_slug != *task_slug {
          return Err(FlowRunError::invalid_argument(format!(
            "both a task slug and a task run ID were provided but the task run found \
             has a different slug: given {:?}, found {:?}",
            task_slug, task_run.task_slug
          )));
        }
      }

      return Ok(self.cache.insert(task_run));
    }

    if let Some(task_slug) = task_slug {
      if let Some(base) = self.cache.mapped_base(&task_slug) {
        return Ok(base);
      }

      debug!(flow_run_id = %self.flow_run_id, task_slug = %task_slug, "task_run_cache_miss");
      let task_run =
        TaskRun::from_task_slug(self.store.as_ref(), &task_slug, &self.flow_run_id, UNMAPPED_INDEX)
          .await?;
      return Ok(self.cache.insert(Arc::new(task_run)));
    }

    Err(FlowRunError::invalid_argument(
      "one of a task run ID, a task, or a task slug must be provided",
    ))
  }

  /// Iterate over the elements of a mapped task in map index order.
  ///
  /// The base record is checked up front: a task whose base state is not
  /// mapped is rejected before any element is queried. Elements are
  /// fetched one per call and the sequence ends at the first missing index.
  /// With `cache_results` unset, elements are not added to the cache.
  pub async fn iter_mapped(
    &mut self,
    query: &TaskRunQuery,
    cache_results: bool,
  ) -> Result<MappedTaskRuns<'_>, FlowRunError> {
    if query.task_run_id.is_some() {
      return Err(FlowRunError::invalid_argument(
        "mapped task runs are looked up by task or task slug, not by task run ID",
      ));
    }

    let task_slug = query.resolve_slug()?.ok_or_else(|| {
      FlowRunError::invalid_argument("either a task or a task slug must be provided")
    })?;

    let base =
      TaskRun::from_task_slug(self.store.as_ref(), &task_slug, &self.flow_run_id, UNMAPPED_INDEX)
        .await?;

    if !base.state.is_mapped() {
      return Err(FlowRunError::invalid_operation(format!(
        "task run '{}' ({}) is not a mapped task",
        base.task_run_id, base.task_slug
      )));
    }

    Ok(MappedTaskRuns::new(self, task_slug, cache_results))
  }

  /// IDs of every task run belonging to this flow run.
  ///
  /// The list is remembered only once the flow run has finished, since a
  /// running flow can still create task runs.
  pub async fn task_run_ids(&mut self) -> Result<Vec<String>, FlowRunError> {
    if let Some(ids) = &self.task_run_ids {
      return Ok(ids.clone());
    }

    let ids = match self.store.list_task_run_ids(&self.flow_run_id).await {
      Ok(ids) => ids,
      Err(e) => {
        warn!(
          flow_run_id = %self.flow_run_id,
          error = %e,
          "task_run_ids_failed"
        );
        return Err(e.into());
      }
    };

    if self.state.is_finished() {
      self.task_run_ids = Some(ids.clone());
    }

    Ok(ids)
  }

  /// Load every task run of this flow run in a single query and cache them.
  ///
  /// Refuses flow runs with more than [`MAX_BULK_TASK_RUNS`] task runs.
  pub async fn get_all(&mut self) -> Result<Vec<Arc<TaskRun>>, FlowRunError> {
    let count = self.task_run_ids().await?.len();
    if count > MAX_BULK_TASK_RUNS {
      return Err(FlowRunError::ResourceLimitExceeded {
        count,
        limit: MAX_BULK_TASK_RUNS,
      });
    }

    let filter = TaskRunFilter::for_flow_run(&self.flow_run_id);
    let task_runs = self
      .store
      .list_task_runs(&filter)
      .await?
      .into_iter()
      .map(|data| self.cache.insert(Arc::new(TaskRun::from(data))))
      .collect();

    Ok(task_runs)
  }
}

impl std::fmt::Display for FlowRun {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "FlowRun(flow_run_id={}, flow_id={}, state={}, cached_task_runs={})",
      self.flow_run_id,
      self.flow_id,
      self.state,
      self.cache.len()
    )
  }
}

impl std::fmt::Debug for FlowRun {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FlowRun")
      .field("flow_run_id", &self.flow_run_id)
      .field("name", &self.name)
      .field("flow_id", &self.flow_id)
      .field("flow_name", &self.flow_name)
      .field("storage", &self.storage)
      .field("run_config", &self.run_config)
      .field("state", &self.state)
      .field("cached_task_runs", &self.cache.len())
      .finish_non_exhaustive()
  }
}
