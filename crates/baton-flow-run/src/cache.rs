//! Task run caching for a single flow run.
//!
//! Task runs are kept in a primary map keyed by task run ID. A secondary
//! index groups IDs by task slug so the base record of a mapped task can be
//! found without a remote query. The index is derived from the primary map
//! and can be rebuilt from it at any time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use baton_store::UNMAPPED_INDEX;

use crate::task_run::TaskRun;

/// Caches task runs fetched for one flow run.
///
/// Entries are never evicted; callers needing fresh data load a new
/// [`FlowRun`](crate::FlowRun).
#[derive(Debug, Clone, Default)]
pub struct TaskRunCache {
  task_runs: HashMap<String, Arc<TaskRun>>,
  slug_index: HashMap<String, HashSet<String>>,
}

impl TaskRunCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a task run and return the cached handle.
  pub fn insert(&mut self, task_run: Arc<TaskRun>) -> Arc<TaskRun> {
    self
      .slug_index
      .entry(task_run.task_slug.clone())
      .or_default()
      .insert(task_run.task_run_id.clone());
    self
      .task_runs
      .insert(task_run.task_run_id.clone(), task_run.clone());
    task_run
  }

  pub fn get(&self, task_run_id: &str) -> Option<&Arc<TaskRun>> {
    self.task_runs.get(task_run_id)
  }

  pub fn contains(&self, task_run_id: &str) -> bool {
    self.task_runs.contains_key(task_run_id)
  }

  /// IDs of cached task runs sharing `task_slug`.
  pub fn ids_for_slug(&self, task_slug: &str) -> Option<&HashSet<String>> {
    self.slug_index.get(task_slug)
  }

  /// The cached base record of a mapped task.
  ///
  /// Only answers when more than one task run is cached for the slug, i.e.
  /// the slug is known to belong to a mapped family.
  pub fn mapped_base(&self, task_slug: &str) -> Option<Arc<TaskRun>> {
    let ids = self.slug_index.get(task_slug)?;
    if ids.len() < 2 {
      return None;
    }

    ids
      .iter()
      .filter_map(|id| self.task_runs.get(id))
      .find(|task_run| task_run.map_index == UNMAPPED_INDEX)
      .cloned()
  }

  /// Rebuild the slug index from the primary map.
  pub fn rebuild_index(&mut self) {
    self.slug_index.clear();
    for (id, task_run) in &self.task_runs {
      self
        .slug_index
        .entry(task_run.task_slug.clone())
        .or_default()
        .insert(id.clone());
    }
  }

  /// All cached task runs keyed by task run ID.
  pub fn task_runs(&self) -> &HashMap<String, Arc<TaskRun>> {
    &self.task_runs
  }

  pub fn values(&self) -> impl Iterator<Item = &Arc<TaskRun>> {
    self.task_runs.values()
  }

  pub fn len(&self) -> usize {
    self.task_runs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.task_runs.is_empty()
  }
}

impl FromIterator<Arc<TaskRun>> for TaskRunCache {
  fn from_iter<I: IntoIterator<Item = Arc<TaskRun>>>(iter: I) -> Self {
    let mut cache = Self::new();
    for task_run in iter {
      cache.insert(task_run);
    }
    cache
  }
}
