use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use baton_flow_run::{FlowRun, LoadOptions, TaskRun, TaskRunQuery};
use baton_store::{MemoryStore, Store};

/// Baton - inspect flow runs and their task runs
#[derive(Parser)]
#[command(name = "baton")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.baton)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON store snapshot (default: <data-dir>/store.json)
  #[arg(long, global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Inspect a flow run
  FlowRun {
    #[command(subcommand)]
    target: FlowRunTarget,
  },
}

#[derive(Subcommand)]
enum FlowRunTarget {
  /// Show a flow run and its static task runs
  Show {
    /// The flow run ID
    flow_run_id: String,
  },

  /// List task runs of a flow run
  TaskRuns {
    /// The flow run ID
    flow_run_id: String,

    /// Only the task run with this slug
    #[arg(long, conflicts_with = "all")]
    slug: Option<String>,

    /// List every element of the mapped task named by --slug
    #[arg(long, requires = "slug")]
    mapped: bool,

    /// Load every task run of the flow run
    #[arg(long)]
    all: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".baton"),
  };
  let store_path = cli.store.unwrap_or_else(|| data_dir.join("store.json"));

  match cli.command {
    Some(Commands::FlowRun { target }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_flow_run_command(target, store_path).await })?;
    }
    None => {
      println!("baton - use --help to see available commands");
    }
  }

  Ok(())
}

async fn open_store(path: &Path) -> Result<Arc<dyn Store>> {
  let store = MemoryStore::load(path)
    .await
    .with_context(|| format!("failed to load store snapshot: {}", path.display()))?;
  Ok(Arc::new(store))
}

async fn run_flow_run_command(target: FlowRunTarget, store_path: PathBuf) -> Result<()> {
  let store = open_store(&store_path).await?;

  match target {
    FlowRunTarget::Show { flow_run_id } => {
      let flow_run = FlowRun::from_flow_run_id(store, &flow_run_id, LoadOptions::default())
        .await
        .with_context(|| format!("failed to load flow run: {}", flow_run_id))?;

      eprintln!("{}", flow_run);
      let output = serde_json::json!({
        "flow_run_id": flow_run.flow_run_id,
        "name": flow_run.name,
        "flow_id": flow_run.flow_id,
        "flow_name": flow_run.flow_name,
        "state": flow_run.state,
        "storage": flow_run.storage,
        "run_config": flow_run.run_config,
        "task_runs": sorted(&flow_run.task_runs().values().cloned().collect::<Vec<_>>()),
      });
      println!("{}", serde_json::to_string_pretty(&output)?);
    }
    FlowRunTarget::TaskRuns {
      flow_run_id,
      slug,
      mapped,
      all,
    } => {
      let mut flow_run =
        FlowRun::from_flow_run_id(store, &flow_run_id, LoadOptions::new().without_static_tasks())
          .await
          .with_context(|| format!("failed to load flow run: {}", flow_run_id))?;

      let task_runs = match slug {
        Some(slug) if mapped => flow_run
          .iter_mapped(&TaskRunQuery::by_slug(&slug), true)
          .await
          .with_context(|| format!("failed to iterate mapped task: {}", slug))?
          .collect()
          .await
          .with_context(|| format!("failed to load mapped task runs: {}", slug))?,
        Some(slug) => vec![
          flow_run
            .get(TaskRunQuery::by_slug(&slug))
            .await
            .with_context(|| format!("failed to load task run: {}", slug))?,
        ],
        None if all => flow_run
          .get_all()
          .await
          .context("failed to load task runs")?,
        None => {
          let ids = flow_run
            .task_run_ids()
            .await
            .context("failed to list task run ids")?;
          println!("{}", serde_json::to_string_pretty(&ids)?);
          return Ok(());
        }
      };

      eprintln!("{} task runs", task_runs.len());
      println!("{}", serde_json::to_string_pretty(&sorted(&task_runs))?);
    }
  }

  Ok(())
}

/// Order task runs by slug then map index for stable output.
fn sorted(task_runs: &[Arc<TaskRun>]) -> Vec<&TaskRun> {
  let mut task_runs: Vec<&TaskRun> = task_runs.iter().map(Arc::as_ref).collect();
  task_runs.sort_by(|a, b| {
    a.task_slug
      .cmp(&b.task_slug)
      .then(a.map_index.cmp(&b.map_index))
  });
  task_runs
}
