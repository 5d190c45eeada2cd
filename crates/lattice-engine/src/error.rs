use thiserror::Error;

use lattice_artifact::ArtifactError;
use lattice_task_executor::TaskExecutionError;

/// Errors raised while executing an artifact.
#[derive(Debug, Error)]
pub enum EngineError {
  /// The control flow points at a space the artifact does not contain.
  #[error("Space {space_id} not found")]
  SpaceNotFound { space_id: String },

  /// A persisted space execution expects a parameter set the artifact does
  /// not carry (the artifact drifted since the run was created).
  #[error("Parameter set {index} not found")]
  ParamSetNotFound { index: i64 },

  /// A space's task order references a task missing from the task table.
  #[error("Task {task_id} not found")]
  TaskNotFound { task_id: String },

  /// A conditional transition was reached and no evaluator capable of the
  /// condition text was injected.
  #[error("unsupported control-flow condition: '{condition}'")]
  UnsupportedCondition { condition: String },

  /// The run was terminated; observed at a parameter-set boundary.
  #[error("run terminated")]
  Terminated,

  /// The cancellation token fired.
  #[error("run cancelled")]
  Cancelled,

  #[error(transparent)]
  Artifact(#[from] ArtifactError),

  #[error(transparent)]
  Store(#[from] lattice_store::Error),

  #[error(transparent)]
  Task(#[from] TaskExecutionError),
}
