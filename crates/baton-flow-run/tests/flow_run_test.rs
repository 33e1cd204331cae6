//! Integration tests for FlowRun lookups against an in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use baton_flow_run::{
  FlowRun, FlowRunError, LoadOptions, MAX_BULK_TASK_RUNS, Task, TaskRun, TaskRunQuery,
};
use baton_store::{FlowRunData, MemoryStore, RunLog, State, Store, TaskRunData, TaskRunFilter};
use futures::TryStreamExt;

const FLOW_RUN_ID: &str = "fr-1";

fn flow_run_data(state: State) -> FlowRunData {
  FlowRunData {
    flow_run_id: FLOW_RUN_ID.to_string(),
    name: "nimble-otter".to_string(),
    flow_id: "flow-1".to_string(),
    flow_name: "etl".to_string(),
    state,
    storage: None,
    run_config: Some(serde_json::json!({ "type": "universal" })),
  }
}

fn task_run_data(id: &str, slug: &str, map_index: i64, state: State) -> TaskRunData {
  TaskRunData {
    task_run_id: id.to_string(),
    flow_run_id: FLOW_RUN_ID.to_string(),
    task_id: format!("task-{}", slug),
    task_slug: slug.to_string(),
    name: None,
    map_index,
    state,
  }
}

async fn create_store(state: State) -> Arc<MemoryStore> {
  let store = Arc::new(MemoryStore::new());
  store.insert_flow_run(flow_run_data(state)).await;
  store
}

/// Insert a mapped task with a base record and `elements` children.
async fn insert_mapped(store: &MemoryStore, slug: &str, elements: i64) {
  store
    .insert_task_run(task_run_data(&format!("{}-base", slug), slug, -1, State::mapped()))
    .await;
  for index in 0..elements {
    store
      .insert_task_run(task_run_data(
        &format!("{}-{}", slug, index),
        slug,
        index,
        State::success(),
      ))
      .await;
  }
}

async fn load(store: &Arc<MemoryStore>, options: LoadOptions) -> FlowRun {
  let dyn_store: Arc<dyn Store> = store.clone();
  FlowRun::from_flow_run_id(dyn_store, FLOW_RUN_ID, options)
    .await
    .expect("flow run should load")
}

#[tokio::test]
async fn test_load_populates_static_tasks() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  store
    .insert_task_run(task_run_data("tr-2", "load-1", 0, State::success()))
    .await;

  let flow_run = load(&store, LoadOptions::default()).await;

  assert_eq!(flow_run.flow_name, "etl");
  assert!(flow_run.state.is_running());
  assert_eq!(flow_run.task_runs().len(), 1);
  assert!(flow_run.task_runs().contains_key("tr-1"));
}

#[tokio::test]
async fn test_load_without_static_tasks_uses_supplied_task_runs() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;

  let known = TaskRun::from(task_run_data("tr-9", "other-1", -1, State::success()));
  let flow_run = load(
    &store,
    LoadOptions::new().without_static_tasks().with_task_runs([known]),
  )
  .await;

  assert_eq!(store.calls().list_task_runs, 0);
  assert_eq!(flow_run.task_runs().len(), 1);
  assert!(flow_run.task_runs().contains_key("tr-9"));
}

#[tokio::test]
async fn test_load_unknown_flow_run() {
  let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
  let result = FlowRun::from_flow_run_id(store, "missing", LoadOptions::default()).await;
  assert!(matches!(
    result,
    Err(FlowRunError::Store(baton_store::Error::NotFound(_)))
  ));
}

#[tokio::test]
async fn test_get_by_id_returns_cached_instance_without_query() {
  let store = create_store(State::running()).await;
  let cached = Arc::new(TaskRun::from(task_run_data(
    "tr-1",
    "extract-1",
    -1,
    State::success(),
  )));
  let mut flow_run = load(
    &store,
    LoadOptions::new()
      .without_static_tasks()
      .with_task_runs([cached.clone()]),
  )
  .await;
  let before = store.calls();

  let found = flow_run.get(TaskRunQuery::by_id("tr-1")).await.unwrap();

  assert!(Arc::ptr_eq(&found, &cached));
  assert_eq!(store.calls(), before);
}

#[tokio::test]
async fn test_get_by_id_fetches_and_caches() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", 0, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let first = flow_run.get(TaskRunQuery::by_id("tr-1")).await.unwrap();
  let second = flow_run.get(TaskRunQuery::by_id("tr-1")).await.unwrap();

  assert_eq!(store.calls().get_task_run, 1);
  assert!(Arc::ptr_eq(&first, &second));
  assert!(flow_run.task_runs().contains_key("tr-1"));
}

#[tokio::test]
async fn test_get_by_id_with_conflicting_slug() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let result = flow_run
    .get(TaskRunQuery::by_id("tr-1").with_slug("load-1"))
    .await;

  assert!(matches!(result, Err(FlowRunError::InvalidArgument { .. })));
  assert!(flow_run.task_runs().is_empty());

  let found = flow_run
    .get(TaskRunQuery::by_slug("extract-1").with_id("tr-1"))
    .await
    .unwrap();
  assert_eq!(found.task_run_id, "tr-1");
  assert_eq!(store.calls().find_task_run, 0);
}

#[tokio::test]
async fn test_get_by_slug_prefers_cached_mapped_base() {
  let store = create_store(State::running()).await;
  let base = Arc::new(TaskRun::from(task_run_data("i1", "x", -1, State::mapped())));
  let element = Arc::new(TaskRun::from(task_run_data("i2", "x", 0, State::success())));
  let mut flow_run = load(
    &store,
    LoadOptions::new()
      .without_static_tasks()
      .with_task_runs([base.clone(), element]),
  )
  .await;
  let before = store.calls();

  let found = flow_run.get(TaskRunQuery::by_slug("x")).await.unwrap();

  assert!(Arc::ptr_eq(&found, &base));
  assert_eq!(store.calls(), before);
}

#[tokio::test]
async fn test_get_by_slug_queries_base_when_family_lacks_it() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "x", 2).await;
  let elements = [
    TaskRun::from(task_run_data("x-0", "x", 0, State::success())),
    TaskRun::from(task_run_data("x-1", "x", 1, State::success())),
  ];
  let mut flow_run = load(
    &store,
    LoadOptions::new().without_static_tasks().with_task_runs(elements),
  )
  .await;

  let found = flow_run.get(TaskRunQuery::by_slug("x")).await.unwrap();

  assert_eq!(found.task_run_id, "x-base");
  assert_eq!(store.calls().find_task_run, 1);
  assert!(flow_run.task_runs().contains_key("x-base"));
}

#[tokio::test]
async fn test_get_by_task_uses_task_slug() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let task = Task::new("extract", "extract-1");
  let found = flow_run.get(TaskRunQuery::for_task(&task)).await.unwrap();

  assert_eq!(found.task_run_id, "tr-1");
}

#[tokio::test]
async fn test_get_by_unregistered_task_is_rejected() {
  let store = create_store(State::running()).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;
  let before = store.calls();

  let result = flow_run
    .get(TaskRunQuery::for_task(&Task::unregistered("extract")))
    .await;

  assert!(matches!(result, Err(FlowRunError::InvalidArgument { .. })));
  assert_eq!(store.calls(), before);
}

#[tokio::test]
async fn test_get_without_identifiers() {
  let store = create_store(State::running()).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let result = flow_run.get(TaskRunQuery::default()).await;
  assert!(matches!(result, Err(FlowRunError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_get_by_slug_not_found_surfaces_store_error() {
  let store = create_store(State::running()).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let result = flow_run.get(TaskRunQuery::by_slug("missing")).await;
  assert!(matches!(
    result,
    Err(FlowRunError::Store(baton_store::Error::NotFound(_)))
  ));
}

#[tokio::test]
async fn test_iter_mapped_yields_elements_in_order() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "load-1", 3).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let task_runs = flow_run
    .iter_mapped(&TaskRunQuery::by_slug("load-1"), true)
    .await
    .unwrap()
    .collect()
    .await
    .unwrap();

  let indices: Vec<i64> = task_runs.iter().map(|t| t.map_index).collect();
  assert_eq!(indices, vec![0, 1, 2]);
  // One query for the base record, one per element, one for the gap.
  assert_eq!(store.calls().find_task_run, 5);
  assert_eq!(flow_run.task_runs().len(), 3);
}

#[tokio::test]
async fn test_iter_mapped_stops_at_first_gap() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "load-1", 2).await;
  store
    .insert_task_run(task_run_data("load-1-5", "load-1", 5, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let mut elements = flow_run
    .iter_mapped(&TaskRunQuery::by_slug("load-1"), true)
    .await
    .unwrap();
  assert_eq!(elements.task_slug(), "load-1");

  assert_eq!(elements.next_task_run().await.unwrap().unwrap().map_index, 0);
  assert_eq!(elements.next_task_run().await.unwrap().unwrap().map_index, 1);
  assert!(elements.next_task_run().await.unwrap().is_none());
  assert!(elements.next_task_run().await.unwrap().is_none());
  assert_eq!(elements.next_index(), 2);
  drop(elements);

  // The exhausted cursor does not query again.
  assert_eq!(store.calls().find_task_run, 4);
}

#[tokio::test]
async fn test_iter_mapped_rejects_unmapped_base_before_fetching_elements() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  store
    .insert_task_run(task_run_data("tr-2", "extract-1", 0, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let result = flow_run
    .iter_mapped(&TaskRunQuery::by_slug("extract-1"), true)
    .await;

  assert!(matches!(result, Err(FlowRunError::InvalidOperation { .. })));
  assert_eq!(store.calls().find_task_run, 1);
}

#[tokio::test]
async fn test_iter_mapped_without_caching() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "load-1", 2).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let task_runs = flow_run
    .iter_mapped(&TaskRunQuery::by_slug("load-1"), false)
    .await
    .unwrap()
    .collect()
    .await
    .unwrap();

  assert_eq!(task_runs.len(), 2);
  assert!(flow_run.task_runs().is_empty());
}

#[tokio::test]
async fn test_iter_mapped_can_run_again() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "load-1", 2).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;
  let query = TaskRunQuery::by_slug("load-1");

  let first = flow_run.iter_mapped(&query, true).await.unwrap().collect().await.unwrap();
  let second = flow_run.iter_mapped(&query, true).await.unwrap().collect().await.unwrap();

  assert_eq!(first.len(), 2);
  assert_eq!(second.len(), 2);
  assert_eq!(second[0].map_index, 0);
}

#[tokio::test]
async fn test_iter_mapped_as_stream() {
  let store = create_store(State::running()).await;
  insert_mapped(&store, "load-1", 4).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let ids: Vec<String> = flow_run
    .iter_mapped(&TaskRunQuery::by_slug("load-1"), true)
    .await
    .unwrap()
    .into_stream()
    .map_ok(|task_run| task_run.task_run_id.clone())
    .try_collect()
    .await
    .unwrap();

  assert_eq!(ids, vec!["load-1-0", "load-1-1", "load-1-2", "load-1-3"]);
}

#[tokio::test]
async fn test_iter_mapped_argument_errors() {
  let store = create_store(State::running()).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let no_slug = flow_run.iter_mapped(&TaskRunQuery::default(), true).await;
  assert!(matches!(no_slug, Err(FlowRunError::InvalidArgument { .. })));

  let by_id = flow_run.iter_mapped(&TaskRunQuery::by_id("tr-1"), true).await;
  assert!(matches!(by_id, Err(FlowRunError::InvalidArgument { .. })));

  let conflict = flow_run
    .iter_mapped(
      &TaskRunQuery::by_slug("a").with_task(&Task::new("b", "b-1")),
      true,
    )
    .await;
  assert!(matches!(conflict, Err(FlowRunError::InvalidArgument { .. })));
  assert_eq!(store.calls().find_task_run, 0);
}

#[tokio::test]
async fn test_get_all_loads_and_caches_everything() {
  let store = create_store(State::success()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  insert_mapped(&store, "load-1", 2).await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let task_runs = flow_run.get_all().await.unwrap();

  assert_eq!(task_runs.len(), 4);
  assert_eq!(flow_run.task_runs().len(), 4);
  assert_eq!(store.calls().list_task_runs, 1);
}

#[tokio::test]
async fn test_get_all_refuses_large_flow_runs() {
  let store = create_store(State::success()).await;
  for _ in 0..=MAX_BULK_TASK_RUNS {
    store
      .add_task_run(FLOW_RUN_ID, "mapped-1", 0, State::success())
      .await;
  }
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;

  let result = flow_run.get_all().await;

  match result {
    Err(FlowRunError::ResourceLimitExceeded { count, limit }) => {
      assert_eq!(count, MAX_BULK_TASK_RUNS + 1);
      assert_eq!(limit, MAX_BULK_TASK_RUNS);
    }
    other => panic!("expected ResourceLimitExceeded, got {:?}", other.map(|v| v.len())),
  }
  assert_eq!(store.calls().list_task_runs, 0);
}

#[tokio::test]
async fn test_task_run_ids_cached_only_when_finished() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;

  let mut running = load(&store, LoadOptions::new().without_static_tasks()).await;
  running.task_run_ids().await.unwrap();
  running.task_run_ids().await.unwrap();
  assert_eq!(store.calls().list_task_run_ids, 2);

  store
    .force_flow_run_state(FLOW_RUN_ID, State::success())
    .await
    .unwrap();
  let mut finished = running.update().await.unwrap();
  finished.task_run_ids().await.unwrap();
  let ids = finished.task_run_ids().await.unwrap();
  assert_eq!(ids, vec!["tr-1".to_string()]);
  assert_eq!(store.calls().list_task_run_ids, 3);
}

#[tokio::test]
async fn test_update_refreshes_state_and_carries_cache() {
  let store = create_store(State::running()).await;
  store
    .insert_task_run(task_run_data("tr-1", "extract-1", -1, State::success()))
    .await;
  let mut flow_run = load(&store, LoadOptions::new().without_static_tasks()).await;
  let cached = flow_run.get(TaskRunQuery::by_id("tr-1")).await.unwrap();

  store
    .force_flow_run_state(FLOW_RUN_ID, State::failed("boom"))
    .await
    .unwrap();
  let refreshed = flow_run.update().await.unwrap();

  assert!(refreshed.state.is_failed());
  assert!(Arc::ptr_eq(refreshed.task_runs().get("tr-1").unwrap(), &cached));
  assert_eq!(
    refreshed.to_string(),
    "FlowRun(flow_run_id=fr-1, flow_id=flow-1, state=Failed(\"boom\"), cached_task_runs=1)"
  );
}

/// Serves flow runs from memory but cannot list task run IDs.
struct NoIdListStore {
  inner: MemoryStore,
  id_list_attempts: AtomicUsize,
}

#[async_trait]
impl Store for NoIdListStore {
  async fn get_flow_run(&self, flow_run_id: &str) -> Result<FlowRunData, baton_store::Error> {
    self.inner.get_flow_run(flow_run_id).await
  }

  async fn get_task_run(&self, task_run_id: &str) -> Result<TaskRunData, baton_store::Error> {
    self.inner.get_task_run(task_run_id).await
  }

  async fn find_task_run(
    &self,
    filter: &TaskRunFilter,
    error_on_empty: bool,
  ) -> Result<Option<TaskRunData>, baton_store::Error> {
    self.inner.find_task_run(filter, error_on_empty).await
  }

  async fn list_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRunData>, baton_store::Error> {
    self.inner.list_task_runs(filter).await
  }

  async fn list_task_run_ids(&self, _flow_run_id: &str) -> Result<Vec<String>, baton_store::Error> {
    self.id_list_attempts.fetch_add(1, Ordering::SeqCst);
    Err(baton_store::Error::unavailable("query timed out"))
  }

  async fn set_flow_run_state(&self, flow_run_id: &str, state: State) -> Result<(), baton_store::Error> {
    self.inner.set_flow_run_state(flow_run_id, state).await
  }

  async fn write_run_logs(&self, logs: Vec<RunLog>) -> Result<(), baton_store::Error> {
    self.inner.write_run_logs(logs).await
  }
}

#[tokio::test]
async fn test_task_run_ids_failure_propagates_and_is_not_cached() {
  let inner = MemoryStore::new();
  inner.insert_flow_run(flow_run_data(State::success())).await;
  let store = Arc::new(NoIdListStore {
    inner,
    id_list_attempts: AtomicUsize::new(0),
  });
  let mut flow_run = FlowRun::from_flow_run_id(store.clone(), FLOW_RUN_ID, LoadOptions::default())
    .await
    .unwrap();

  for _ in 0..2 {
    let result = flow_run.task_run_ids().await;
    assert!(matches!(
      result,
      Err(FlowRunError::Store(baton_store::Error::Unavailable { .. }))
    ));
  }
  assert_eq!(store.id_list_attempts.load(Ordering::SeqCst), 2);

  // get_all needs the ID list first, so it fails before any bulk query.
  assert!(flow_run.get_all().await.is_err());
  assert_eq!(store.id_list_attempts.load(Ordering::SeqCst), 3);
}
