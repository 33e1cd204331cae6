//! Baton Flow Run
//!
//! This crate provides [`FlowRun`], a client-side handle for one execution of
//! a registered flow. It owns a read-through cache of the run's task runs and
//! implements the lookup protocols on top of a remote [`Store`].
//!
//! # Architecture
//!
//! ```text
//! FlowRun
//! ├── from_flow_run_id(store, id, options) - load head-of-line data
//! ├── get(query) -> TaskRun           - cache first, then the store
//! ├── iter_mapped(query) -> MappedTaskRuns
//! │   └── next_task_run() - one store query per map index, stops at first gap
//! ├── get_all() -> Vec<TaskRun>       - single bulk query, capped
//! └── update() -> FlowRun             - fresh state, cache carried over
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use baton_flow_run::{FlowRun, LoadOptions, TaskRunQuery};
//!
//! let mut flow_run = FlowRun::from_flow_run_id(store, "fr-1", LoadOptions::default()).await?;
//!
//! let extract = flow_run.get(TaskRunQuery::by_slug("extract-1")).await?;
//!
//! let mut elements = flow_run.iter_mapped(&TaskRunQuery::by_slug("load-1"), true).await?;
//! while let Some(task_run) = elements.next_task_run().await? {
//!     println!("{} -> {}", task_run.map_index, task_run.state);
//! }
//! ```
//!
//! [`Store`]: baton_store::Store

mod cache;
mod error;
mod flow_run;
mod mapped;
mod task_run;

pub use cache::TaskRunCache;
pub use error::FlowRunError;
pub use flow_run::{FlowRun, LoadOptions, MAX_BULK_TASK_RUNS};
pub use mapped::MappedTaskRuns;
pub use task_run::{Task, TaskRun, TaskRunQuery};
