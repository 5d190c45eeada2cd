//! Run orchestration: run lifecycle, the control-flow loop, and the final
//! summary.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use lattice_artifact::Artifact;
use lattice_model::END;
use lattice_store::{Run, RunStatus, Store};
use lattice_task_executor::TaskExecutor;

use crate::control::{ConditionEvaluator, ControlFlowRuntime, RejectingEvaluator, RunContext};
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::space::SpaceExecutor;

/// Options for one run invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Resume the existing non-completed run for this (experiment, version)
  /// instead of starting fresh.
  pub resume: bool,

  /// Deadline for each task subprocess. `None` uses the executor default.
  pub task_deadline: Option<Duration>,
}

/// Per-status task totals for a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  #[serde(rename = "totalTasks")]
  pub total_tasks: u64,
  #[serde(rename = "completedTasks")]
  pub completed_tasks: u64,
  #[serde(rename = "failedTasks")]
  pub failed_tasks: u64,
  #[serde(rename = "skippedTasks")]
  pub skipped_tasks: u64,
}

/// The result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
  #[serde(rename = "runId")]
  pub run_id: String,
  pub status: RunStatus,
  #[serde(rename = "completedSpaces")]
  pub completed_spaces: Vec<String>,
  /// Final data mappings per space (the last parameter set's values).
  pub outputs: BTreeMap<String, BTreeMap<String, String>>,
  pub summary: RunSummary,
}

/// Owns the run lifecycle: fresh versus resumed runs, the control-flow loop,
/// and final aggregation.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `Orchestrator::new()` for a default orchestrator with
/// no-op notifications, or `Orchestrator::with_notifier()` to observe
/// events.
pub struct Orchestrator<N: ExecutionNotifier = NoopNotifier> {
  store: Arc<dyn Store>,
  evaluator: Arc<dyn ConditionEvaluator>,
  notifier: Arc<N>,
  cancel: CancellationToken,
  options: RunOptions,
}

impl Orchestrator<NoopNotifier> {
  /// Create a new orchestrator with no-op notifications.
  pub fn new(store: Arc<dyn Store>, options: RunOptions) -> Self {
    Self::with_notifier(store, options, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Orchestrator<N> {
  /// Create a new orchestrator with a custom notifier.
  pub fn with_notifier(store: Arc<dyn Store>, options: RunOptions, notifier: N) -> Self {
    Self {
      store,
      evaluator: Arc::new(RejectingEvaluator),
      notifier: Arc::new(notifier),
      cancel: CancellationToken::new(),
      options,
    }
  }

  /// Replace the condition evaluator used for conditional transitions.
  pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
    self.evaluator = evaluator;
    self
  }

  /// Token observed at parameter-set boundaries; cancel it to stop the run.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Execute the artifact at `artifact_path`. The store is released on
  /// every exit path — success, failure, or early return.
  pub async fn run(&self, artifact_path: &Path) -> Result<RunOutcome, EngineError> {
    let result = self.run_inner(artifact_path).await;
    self.store.close().await;
    result
  }

  #[instrument(name = "run", skip(self, artifact_path))]
  async fn run_inner(&self, artifact_path: &Path) -> Result<RunOutcome, EngineError> {
    // Structural validation happens here, before any run record exists.
    let artifact = Artifact::load(artifact_path).await?;

    let run_id = self.open_run(&artifact, artifact_path).await?;
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      experiment: artifact.experiment.clone(),
    });

    let control =
      ControlFlowRuntime::new(artifact.control.transitions.clone(), self.evaluator.clone());
    let task_executor = match self.options.task_deadline {
      Some(deadline) => TaskExecutor::with_deadline(self.store.clone(), deadline),
      None => TaskExecutor::new(self.store.clone()),
    };
    let spaces = SpaceExecutor::new(
      self.store.clone(),
      task_executor,
      self.notifier.clone(),
      self.cancel.clone(),
    );

    match self.drive(&run_id, &artifact, &control, &spaces).await {
      Ok(completed_spaces) => {
        let outputs = self.collect_outputs(&run_id, &artifact, &completed_spaces).await?;
        let summary = self.summarize(&run_id, &artifact).await?;
        self
          .store
          .update_run_status(&run_id, RunStatus::Completed, Some(Utc::now()))
          .await?;
        info!(run_id = %run_id, "run completed");
        self.notifier.notify(ExecutionEvent::RunCompleted {
          run_id: run_id.clone(),
        });
        Ok(RunOutcome {
          run_id,
          status: RunStatus::Completed,
          completed_spaces,
          outputs,
          summary,
        })
      }
      Err(e) => {
        // A terminated run keeps its status; anything else still running is
        // marked failed. Granular completed records stay intact for resume.
        if let Ok(run) = self.store.get_run(&run_id).await {
          if run.status == RunStatus::Running {
            let _ = self
              .store
              .update_run_status(&run_id, RunStatus::Failed, Some(Utc::now()))
              .await;
          }
        }
        error!(run_id = %run_id, error = %e, "run failed");
        self.notifier.notify(ExecutionEvent::RunFailed {
          run_id: run_id.clone(),
          error: e.to_string(),
        });
        Err(e)
      }
    }
  }

  /// Reuse the existing non-completed run when resuming, otherwise cascade-
  /// delete any prior attempt and create a fresh run.
  async fn open_run(&self, artifact: &Artifact, artifact_path: &Path) -> Result<String, EngineError> {
    let existing = self
      .store
      .find_run(&artifact.experiment, &artifact.version)
      .await?;

    if self.options.resume {
      if let Some(run) = &existing {
        if run.status != RunStatus::Completed {
          self.store.reopen_run(&run.id).await?;
          info!(
            run_id = %run.id,
            current_space = run.current_space.as_deref().unwrap_or(&artifact.control.start),
            "resuming run"
          );
          return Ok(run.id.clone());
        }
      }
    }

    if let Some(run) = existing {
      // Fresh start keeps only the latest attempt's history.
      self.store.delete_run_cascade(&run.id).await?;
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    self
      .store
      .create_run(&Run {
        id: run_id.clone(),
        experiment_name: artifact.experiment.clone(),
        experiment_version: artifact.version.clone(),
        artifact_path: artifact_path.to_string_lossy().into_owned(),
        artifact_hash: artifact.content_hash(),
        status: RunStatus::Running,
        start_time: Utc::now(),
        end_time: None,
        current_space: Some(artifact.control.start.clone()),
        current_param_set: None,
      })
      .await?;
    info!(run_id = %run_id, experiment = %artifact.experiment, "created fresh run");

    Ok(run_id)
  }

  /// Walk the control-flow graph from the persisted position to END,
  /// persisting the new position before each advance.
  async fn drive(
    &self,
    run_id: &str,
    artifact: &Artifact,
    control: &ControlFlowRuntime,
    spaces: &SpaceExecutor<N>,
  ) -> Result<Vec<String>, EngineError> {
    let mut current = control
      .get_state(self.store.as_ref(), run_id)
      .await?
      .unwrap_or_else(|| artifact.control.start.clone());
    let mut completed_spaces = Vec::new();

    while current != END {
      if self.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }

      let space = artifact
        .space(&current)
        .ok_or_else(|| EngineError::SpaceNotFound {
          space_id: current.clone(),
        })?;
      spaces.execute(run_id, space, &artifact.tasks).await?;
      completed_spaces.push(current.clone());

      let ctx = RunContext {
        run_id: run_id.to_string(),
        experiment_name: artifact.experiment.clone(),
        experiment_version: artifact.version.clone(),
        current_space: current.clone(),
      };
      let next = control.next_space(&current, &ctx).await?;
      control.save_state(self.store.as_ref(), run_id, &next).await?;
      current = next;
    }

    Ok(completed_spaces)
  }

  /// Final outputs per space: the data mappings of the last parameter set,
  /// read back from the store so resumed runs report the same values a
  /// single-shot run would.
  async fn collect_outputs(
    &self,
    run_id: &str,
    artifact: &Artifact,
    completed_spaces: &[String],
  ) -> Result<BTreeMap<String, BTreeMap<String, String>>, EngineError> {
    let mut outputs = BTreeMap::new();
    for space_id in completed_spaces {
      let Some(space) = artifact.space(space_id) else {
        continue;
      };
      if space.parameters.is_empty() {
        continue;
      }
      let last_index = space.parameters.len() as i64 - 1;
      let mappings = self
        .store
        .list_data_mappings(run_id, space_id, last_index)
        .await?;
      outputs.insert(
        space_id.clone(),
        mappings
          .into_iter()
          .map(|m| (m.data_name, m.data_value))
          .collect(),
      );
    }
    Ok(outputs)
  }

  async fn summarize(&self, run_id: &str, artifact: &Artifact) -> Result<RunSummary, EngineError> {
    let counts = self.store.task_status_counts(run_id).await?;
    let total_tasks = artifact.total_tasks();
    let completed_tasks = counts.get("completed").copied().unwrap_or(0) as u64;
    let failed_tasks = counts.get("failed").copied().unwrap_or(0) as u64;
    Ok(RunSummary {
      total_tasks,
      completed_tasks,
      failed_tasks,
      skipped_tasks: total_tasks.saturating_sub(completed_tasks + failed_tasks),
    })
  }
}
