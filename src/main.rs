use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use lattice_artifact::{ArtifactError, Assembler};
use lattice_engine::{Orchestrator, RunOptions};
use lattice_model::Project;
use lattice_resolver::WorkflowSet;
use lattice_store::{RunStatus, SqliteStore, Store};

/// Lattice - a parameter-sweep experiment engine
#[derive(Parser)]
#[command(name = "lattice")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the state database (default: ~/.lattice/lattice.db)
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile a project file into an executable artifact
  Compile {
    /// Path to the project file (workflows + experiment, JSON)
    project_file: PathBuf,

    /// Where to write the artifact (default: artifact.json)
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Seed for random-search expansion; unset draws from entropy
    #[arg(long)]
    seed: Option<u64>,
  },

  /// Execute a compiled artifact
  Run {
    /// Path to the artifact file
    artifact_file: PathBuf,

    /// Resume the existing non-completed run instead of starting fresh
    #[arg(long)]
    resume: bool,

    /// Deadline in seconds for each task subprocess
    #[arg(long)]
    task_timeout: Option<u64>,
  },

  /// Show the persisted state of a run
  Status {
    experiment: String,
    version: String,
  },

  /// Mark a run terminated (observed at the next parameter-set boundary)
  Terminate {
    experiment: String,
    version: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("LATTICE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let db_path = cli.db.unwrap_or_else(|| {
    dirs::home_dir()
      .expect("could not determine home directory")
      .join(".lattice")
      .join("lattice.db")
  });

  match cli.command {
    Commands::Compile {
      project_file,
      out,
      seed,
    } => compile(project_file, out, seed).await,
    Commands::Run {
      artifact_file,
      resume,
      task_timeout,
    } => run(artifact_file, resume, task_timeout, db_path).await,
    Commands::Status {
      experiment,
      version,
    } => status(&experiment, &version, db_path).await,
    Commands::Terminate {
      experiment,
      version,
    } => terminate(&experiment, &version, db_path).await,
  }
}

async fn compile(project_file: PathBuf, out: Option<PathBuf>, seed: Option<u64>) -> Result<()> {
  let content = tokio::fs::read_to_string(&project_file)
    .await
    .with_context(|| format!("failed to read project file: {}", project_file.display()))?;
  let project: Project = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse project file: {}", project_file.display()))?;

  eprintln!("Loaded experiment: {}", project.experiment.name);

  let mut rng = match seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  };
  let workflows = WorkflowSet::new(project.workflows);
  let artifact = match Assembler::new(&workflows).assemble(&project.experiment, &mut rng) {
    Ok(artifact) => artifact,
    Err(ArtifactError::Validation(report)) => {
      eprintln!("Validation failed:\n{report}");
      bail!("experiment '{}' is not valid", project.experiment.name);
    }
    Err(e) => return Err(e).context("artifact assembly failed"),
  };

  let param_sets: usize = artifact.spaces.iter().map(|s| s.parameters.len()).sum();
  eprintln!(
    "Compiled {} tasks, {} spaces, {} parameter sets",
    artifact.tasks.len(),
    artifact.spaces.len(),
    param_sets
  );

  let out = out.unwrap_or_else(|| PathBuf::from("artifact.json"));
  artifact
    .save(&out)
    .await
    .with_context(|| format!("failed to write artifact: {}", out.display()))?;
  eprintln!("Wrote artifact to {}", out.display());

  Ok(())
}

async fn run(
  artifact_file: PathBuf,
  resume: bool,
  task_timeout: Option<u64>,
  db_path: PathBuf,
) -> Result<()> {
  let store = open_store(&db_path).await?;

  let options = RunOptions {
    resume,
    task_deadline: task_timeout.map(Duration::from_secs),
  };
  let orchestrator = Orchestrator::new(store, options);

  // Ctrl-C cancels cooperatively at the next parameter-set boundary.
  let cancel = orchestrator.cancellation_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupt received, stopping at the next parameter-set boundary");
      cancel.cancel();
    }
  });

  // The orchestrator releases the store on every exit path.
  let outcome = orchestrator
    .run(&artifact_file)
    .await
    .context("run failed")?;

  println!("{}", serde_json::to_string_pretty(&outcome)?);
  Ok(())
}

async fn status(experiment: &str, version: &str, db_path: PathBuf) -> Result<()> {
  let store = open_store(&db_path).await?;

  let run = store
    .find_run(experiment, version)
    .await
    .context("failed to query run")?;
  let Some(run) = run else {
    store.close().await;
    bail!("no run found for {experiment} {version}");
  };

  let spaces = store.space_status_counts(&run.id).await?;
  let param_sets = store.param_set_status_counts(&run.id).await?;
  let tasks = store.task_status_counts(&run.id).await?;
  store.close().await;

  let report = serde_json::json!({
    "run": run,
    "spaces": spaces,
    "paramSets": param_sets,
    "tasks": tasks,
  });
  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}

async fn terminate(experiment: &str, version: &str, db_path: PathBuf) -> Result<()> {
  let store = open_store(&db_path).await?;

  let run = store
    .find_run(experiment, version)
    .await
    .context("failed to query run")?;
  let Some(run) = run else {
    store.close().await;
    bail!("no run found for {experiment} {version}");
  };

  let result = store
    .update_run_status(&run.id, RunStatus::Terminated, Some(chrono::Utc::now()))
    .await;
  store.close().await;
  result.with_context(|| format!("failed to terminate run {}", run.id))?;

  eprintln!("Run {} marked terminated; the engine stops at the next parameter-set boundary", run.id);
  Ok(())
}

async fn open_store(db_path: &std::path::Path) -> Result<Arc<SqliteStore>> {
  if let Some(parent) = db_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create data directory: {}", parent.display()))?;
  }
  let store = SqliteStore::open(db_path)
    .await
    .with_context(|| format!("failed to open state database: {}", db_path.display()))?;
  store
    .migrate()
    .await
    .context("failed to run database migrations")?;
  Ok(Arc::new(store))
}
