//! Task execution errors.

use thiserror::Error;

/// Errors that can occur while executing one task. All of them are fatal to
/// the enclosing parameter set; completed records from other parameter sets
/// stay valid for resume.
#[derive(Debug, Error)]
pub enum TaskExecutionError {
  /// The implementation subprocess could not be spawned.
  #[error("failed to spawn task implementation '{implementation}': {source}")]
  Spawn {
    implementation: String,
    #[source]
    source: std::io::Error,
  },

  /// The implementation exited non-zero. Carries the captured stderr text.
  #[error("Task failed with exit code {code}: {stderr}")]
  NonZeroExit { code: i32, stderr: String },

  /// The implementation printed fewer values than the task declares outputs.
  #[error("Missing output for '{name}' or insufficient outputs returned")]
  MissingOutput { name: String },

  /// The implementation exceeded the configured deadline.
  #[error("task timed out after {seconds}s")]
  Timeout { seconds: u64 },

  /// A store write or read failed.
  #[error(transparent)]
  Store(#[from] lattice_store::Error),
}
