//! Lazy iteration over the elements of a mapped task.

use std::sync::Arc;

use baton_store::TaskRunFilter;
use futures::Stream;
use tracing::debug;

use crate::error::FlowRunError;
use crate::flow_run::FlowRun;
use crate::task_run::TaskRun;

/// Cursor over the task runs of one mapped task, in map index order.
///
/// Created by [`FlowRun::iter_mapped`]. Each call to
/// [`next_task_run`](Self::next_task_run) queries the store for the next map
/// index; the first index with no task run ends the sequence. Indices are
/// assumed to be dense from 0, so a gap hides any later elements.
///
/// The cursor is not restartable: iterate again by calling
/// [`FlowRun::iter_mapped`] again.
pub struct MappedTaskRuns<'a> {
  flow_run: &'a mut FlowRun,
  task_slug: String,
  next_index: i64,
  cache_results: bool,
  done: bool,
}

impl<'a> MappedTaskRuns<'a> {
  pub(crate) fn new(flow_run: &'a mut FlowRun, task_slug: String, cache_results: bool) -> Self {
    Self {
      flow_run,
      task_slug,
      next_index: 0,
      cache_results,
      done: false,
    }
  }

  pub fn task_slug(&self) -> &str {
    &self.task_slug
  }

  /// Map index the next call will query.
  pub fn next_index(&self) -> i64 {
    self.next_index
  }

  /// Fetch the next element, or `None` once the sequence has ended.
  pub async fn next_task_run(&mut self) -> Result<Option<Arc<TaskRun>>, FlowRunError> {
    if self.done {
      return Ok(None);
    }

    let filter = TaskRunFilter::for_flow_run(&self.flow_run.flow_run_id)
      .task_slug(&self.task_slug)
      .map_index(self.next_index);

    let data = match self.flow_run.store.find_task_run(&filter, false).await {
      Ok(Some(data)) => data,
      Ok(None) => {
        debug!(
          flow_run_id = %self.flow_run.flow_run_id,
          task_slug = %self.task_slug,
          elements = self.next_index,
          "mapped_task_runs_exhausted"
        );
        self.done = true;
        return Ok(None);
      }
      Err(e) => {
        self.done = true;
        return Err(e.into());
      }
    };

    let task_run = Arc::new(TaskRun::from(data));
    if self.cache_results {
      self.flow_run.cache_mut().insert(task_run.clone());
    }

    self.next_index += 1;
    Ok(Some(task_run))
  }

  /// Drain the remaining elements into a vector.
  pub async fn collect(mut self) -> Result<Vec<Arc<TaskRun>>, FlowRunError> {
    let mut task_runs = Vec::new();
    while let Some(task_run) = self.next_task_run().await? {
      task_runs.push(task_run);
    }
    Ok(task_runs)
  }

  /// Convert the cursor into a [`Stream`].
  pub fn into_stream(self) -> impl Stream<Item = Result<Arc<TaskRun>, FlowRunError>> + 'a {
    futures::stream::try_unfold(self, |mut cursor| async move {
      let next = cursor.next_task_run().await?;
      Ok::<_, FlowRunError>(next.map(|task_run| (task_run, cursor)))
    })
  }
}
