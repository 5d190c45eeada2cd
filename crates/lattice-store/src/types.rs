use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Status of a run. `Completed`, `Failed` and `Terminated` are terminal:
/// normal lifecycle writes never move a run out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Running,
  Completed,
  Failed,
  Terminated,
}

impl RunStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, Self::Running)
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Terminated => "terminated",
    };
    f.write_str(s)
  }
}

/// Status of a space, parameter-set or task execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Completed,
  Failed,
}

/// One execution attempt of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Run {
  pub id: String,
  pub experiment_name: String,
  pub experiment_version: String,
  pub artifact_path: String,
  pub artifact_hash: String,
  pub status: RunStatus,
  pub start_time: DateTime<Utc>,
  pub end_time: Option<DateTime<Utc>>,
  /// Control-flow position, persisted for crash-safe resumption.
  pub current_space: Option<String>,
  pub current_param_set: Option<i64>,
}

/// Execution record for one space within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SpaceExecution {
  pub run_id: String,
  pub space_id: String,
  pub status: ExecutionStatus,
  pub start_time: DateTime<Utc>,
  pub end_time: Option<DateTime<Utc>>,
  pub total_param_sets: i64,
  pub total_tasks: i64,
}

/// Execution record for one parameter set within a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ParamSetExecution {
  pub run_id: String,
  pub space_id: String,
  #[sqlx(rename = "param_set_index")]
  pub index: i64,
  /// Content hash of the parameter set, independent of insertion order.
  pub params_hash: String,
  pub status: ExecutionStatus,
  pub start_time: DateTime<Utc>,
  pub end_time: Option<DateTime<Utc>>,
}

/// Execution record for one task within a parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskExecution {
  pub run_id: String,
  pub space_id: String,
  pub param_set_index: i64,
  pub task_id: String,
  pub status: ExecutionStatus,
  pub start_time: DateTime<Utc>,
  pub end_time: Option<DateTime<Utc>>,
  pub error_message: Option<String>,
}

/// A persisted task-output value, the sole channel by which one task's
/// output becomes another's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DataMapping {
  pub run_id: String,
  pub space_id: String,
  pub param_set_index: i64,
  pub data_name: String,
  pub data_value: String,
}
