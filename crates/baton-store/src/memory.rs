//! In-memory store.
//!
//! Holds flow runs, task runs and run logs in process memory. Every trait
//! call is counted, and state/log writes are recorded, so tests can assert
//! exactly which remote operations a caller performed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::state::State;
use crate::types::{FlowRunData, RunLog, TaskRunData, TaskRunFilter};
use crate::{Error, Store};

/// Serializable contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
  #[serde(default)]
  pub flow_runs: Vec<FlowRunData>,
  #[serde(default)]
  pub task_runs: Vec<TaskRunData>,
  #[serde(default)]
  pub logs: Vec<RunLog>,
}

/// Number of calls made to each [`Store`] operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
  pub get_flow_run: usize,
  pub get_task_run: usize,
  pub find_task_run: usize,
  pub list_task_runs: usize,
  pub list_task_run_ids: usize,
  pub set_flow_run_state: usize,
  pub write_run_logs: usize,
}

impl StoreCalls {
  /// Task run reads of any kind.
  pub fn task_run_reads(&self) -> usize {
    self.get_task_run + self.find_task_run + self.list_task_runs + self.list_task_run_ids
  }
}

#[derive(Default)]
struct Counters {
  get_flow_run: AtomicUsize,
  get_task_run: AtomicUsize,
  find_task_run: AtomicUsize,
  list_task_runs: AtomicUsize,
  list_task_run_ids: AtomicUsize,
  set_flow_run_state: AtomicUsize,
  write_run_logs: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
  counter.fetch_add(1, Ordering::Relaxed);
}

/// A [`Store`] backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
  flow_runs: RwLock<HashMap<String, FlowRunData>>,
  task_runs: RwLock<Vec<TaskRunData>>,
  logs: RwLock<Vec<RunLog>>,
  state_writes: RwLock<Vec<(String, State)>>,
  counters: Counters,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a store pre-populated from a snapshot.
  pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
    let flow_runs = snapshot
      .flow_runs
      .into_iter()
      .map(|run| (run.flow_run_id.clone(), run))
      .collect();

    Self {
      flow_runs: RwLock::new(flow_runs),
      task_runs: RwLock::new(snapshot.task_runs),
      logs: RwLock::new(snapshot.logs),
      ..Self::default()
    }
  }

  /// Load a store from a JSON snapshot file.
  pub async fn load(path: &Path) -> Result<Self, Error> {
    let content = tokio::fs::read_to_string(path).await?;
    let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
    Ok(Self::from_snapshot(snapshot))
  }

  pub async fn snapshot(&self) -> StoreSnapshot {
    let mut flow_runs: Vec<FlowRunData> = self.flow_runs.read().await.values().cloned().collect();
    flow_runs.sort_by(|a, b| a.flow_run_id.cmp(&b.flow_run_id));

    StoreSnapshot {
      flow_runs,
      task_runs: self.task_runs.read().await.clone(),
      logs: self.logs.read().await.clone(),
    }
  }

  pub async fn insert_flow_run(&self, flow_run: FlowRunData) {
    self
      .flow_runs
      .write()
      .await
      .insert(flow_run.flow_run_id.clone(), flow_run);
  }

  pub async fn insert_task_run(&self, task_run: TaskRunData) {
    self.task_runs.write().await.push(task_run);
  }

  /// Insert a task run with a generated ID and return the ID.
  pub async fn add_task_run(
    &self,
    flow_run_id: &str,
    task_slug: &str,
    map_index: i64,
    state: State,
  ) -> String {
    let task_run_id = uuid::Uuid::new_v4().to_string();
    self
      .insert_task_run(TaskRunData {
        task_run_id: task_run_id.clone(),
        flow_run_id: flow_run_id.to_string(),
        task_id: format!("task-{}", task_slug),
        task_slug: task_slug.to_string(),
        name: None,
        map_index,
        state,
      })
      .await;
    task_run_id
  }

  /// Overwrite a flow run's state without counting it as a client write.
  ///
  /// Stands in for a concurrent actor moving the run.
  pub async fn force_flow_run_state(&self, flow_run_id: &str, state: State) -> Result<(), Error> {
    let mut flow_runs = self.flow_runs.write().await;
    let flow_run = flow_runs
      .get_mut(flow_run_id)
      .ok_or_else(|| Error::NotFound(format!("flow run {}", flow_run_id)))?;
    flow_run.state = state;
    Ok(())
  }

  pub fn calls(&self) -> StoreCalls {
    let c = &self.counters;
    StoreCalls {
      get_flow_run: c.get_flow_run.load(Ordering::Relaxed),
      get_task_run: c.get_task_run.load(Ordering::Relaxed),
      find_task_run: c.find_task_run.load(Ordering::Relaxed),
      list_task_runs: c.list_task_runs.load(Ordering::Relaxed),
      list_task_run_ids: c.list_task_run_ids.load(Ordering::Relaxed),
      set_flow_run_state: c.set_flow_run_state.load(Ordering::Relaxed),
      write_run_logs: c.write_run_logs.load(Ordering::Relaxed),
    }
  }

  /// State writes made through [`Store::set_flow_run_state`], oldest first.
  pub async fn state_writes(&self) -> Vec<(String, State)> {
    self.state_writes.read().await.clone()
  }

  pub async fn run_logs(&self) -> Vec<RunLog> {
    self.logs.read().await.clone()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get_flow_run(&self, flow_run_id: &str) -> Result<FlowRunData, Error> {
    bump(&self.counters.get_flow_run);
    self
      .flow_runs
      .read()
      .await
      .get(flow_run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("flow run {}", flow_run_id)))
  }

  async fn get_task_run(&self, task_run_id: &str) -> Result<TaskRunData, Error> {
    bump(&self.counters.get_task_run);
    self
      .task_runs
      .read()
      .await
      .iter()
      .find(|run| run.task_run_id == task_run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("task run {}", task_run_id)))
  }

  async fn find_task_run(
    &self,
    filter: &TaskRunFilter,
    error_on_empty: bool,
  ) -> Result<Option<TaskRunData>, Error> {
    bump(&self.counters.find_task_run);
    let found = self
      .task_runs
      .read()
      .await
      .iter()
      .find(|run| filter.matches(run))
      .cloned();

    match found {
      None if error_on_empty => Err(Error::NotFound(format!("task run matching {}", filter))),
      found => Ok(found),
    }
  }

  async fn list_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRunData>, Error> {
    bump(&self.counters.list_task_runs);
    Ok(
      self
        .task_runs
        .read()
        .await
        .iter()
        .filter(|run| filter.matches(run))
        .cloned()
        .collect(),
    )
  }

  async fn list_task_run_ids(&self, flow_run_id: &str) -> Result<Vec<String>, Error> {
    bump(&self.counters.list_task_run_ids);
    Ok(
      self
        .task_runs
        .read()
        .await
        .iter()
        .filter(|run| run.flow_run_id == flow_run_id)
        .map(|run| run.task_run_id.clone())
        .collect(),
    )
  }

  async fn set_flow_run_state(&self, flow_run_id: &str, state: State) -> Result<(), Error> {
    bump(&self.counters.set_flow_run_state);
    {
      let mut flow_runs = self.flow_runs.write().await;
      let flow_run = flow_runs
        .get_mut(flow_run_id)
        .ok_or_else(|| Error::NotFound(format!("flow run {}", flow_run_id)))?;
      flow_run.state = state.clone();
    }
    self
      .state_writes
      .write()
      .await
      .push((flow_run_id.to_string(), state));
    Ok(())
  }

  async fn write_run_logs(&self, logs: Vec<RunLog>) -> Result<(), Error> {
    bump(&self.counters.write_run_logs);
    self.logs.write().await.extend(logs);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::State;
  use crate::types::{LogLevel, UNMAPPED_INDEX};

  fn flow_run(flow_run_id: &str, state: State) -> FlowRunData {
    FlowRunData {
      flow_run_id: flow_run_id.to_string(),
      name: "nimble-otter".to_string(),
      flow_id: "flow-1".to_string(),
      flow_name: "etl".to_string(),
      state,
      storage: None,
      run_config: None,
    }
  }

  #[tokio::test]
  async fn test_find_task_run_error_on_empty() {
    let store = MemoryStore::new();
    let filter = TaskRunFilter::for_flow_run("fr-1").task_slug("missing");

    assert!(store.find_task_run(&filter, false).await.unwrap().is_none());
    assert!(matches!(
      store.find_task_run(&filter, true).await,
      Err(Error::NotFound(_))
    ));
    assert_eq!(store.calls().find_task_run, 2);
  }

  #[tokio::test]
  async fn test_set_flow_run_state_is_recorded() {
    let store = MemoryStore::new();
    store.insert_flow_run(flow_run("fr-1", State::running())).await;

    store
      .set_flow_run_state("fr-1", State::failed("boom"))
      .await
      .unwrap();

    assert_eq!(
      store.get_flow_run("fr-1").await.unwrap().state,
      State::failed("boom")
    );
    assert_eq!(
      store.state_writes().await,
      vec![("fr-1".to_string(), State::failed("boom"))]
    );
  }

  #[tokio::test]
  async fn test_force_state_is_not_a_client_write() {
    let store = MemoryStore::new();
    store.insert_flow_run(flow_run("fr-1", State::running())).await;

    store
      .force_flow_run_state("fr-1", State::success())
      .await
      .unwrap();

    assert!(store.state_writes().await.is_empty());
    assert_eq!(store.calls().set_flow_run_state, 0);
  }

  #[tokio::test]
  async fn test_set_state_on_unknown_flow_run() {
    let store = MemoryStore::new();
    let result = store.set_flow_run_state("nope", State::running()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(store.state_writes().await.is_empty());
  }

  #[tokio::test]
  async fn test_list_task_run_ids_scoped_to_flow_run() {
    let store = MemoryStore::new();
    let a = store
      .add_task_run("fr-1", "a", UNMAPPED_INDEX, State::success())
      .await;
    store
      .add_task_run("fr-2", "a", UNMAPPED_INDEX, State::success())
      .await;

    assert_eq!(store.list_task_run_ids("fr-1").await.unwrap(), vec![a]);
  }

  #[tokio::test]
  async fn test_write_run_logs_appends() {
    let store = MemoryStore::new();
    store
      .write_run_logs(vec![RunLog::new("fr-1", "test", "hello", LogLevel::Info)])
      .await
      .unwrap();

    let logs = store.run_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "hello");
  }
}
