//! Lattice Store
//!
//! This crate provides the durable state store for runs. Data is persisted
//! to SQLite; every write completes before the call returns, so a crash
//! immediately after a "mark completed" write never rolls it back —
//! resumability depends on that.
//!
//! The [`Store`] trait defines operations for:
//! - Run lifecycle (create, find, status transitions, fresh-start cascade)
//! - Space, parameter-set and task execution records
//! - Data mappings (persisted task outputs)
//! - Per-status aggregate counts for a run
//!
//! One store connection belongs to exactly one run invocation; concurrent
//! runs must use independent instances.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{
  DataMapping, ExecutionStatus, ParamSetExecution, Run, RunStatus, SpaceExecution, TaskExecution,
};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The run is in a terminal status and cannot transition further.
  #[error("run {run_id} is {status} and cannot transition")]
  TerminalRun { run_id: String, status: RunStatus },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for runs and their execution records.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a new run.
  async fn create_run(&self, run: &Run) -> Result<(), Error>;

  /// Get a run by id.
  async fn get_run(&self, run_id: &str) -> Result<Run, Error>;

  /// Find the run for an (experiment, version) pair, if any.
  async fn find_run(&self, experiment: &str, version: &str) -> Result<Option<Run>, Error>;

  /// Transition a run's status. Refused for runs already in a terminal
  /// status.
  async fn update_run_status(
    &self,
    run_id: &str,
    status: RunStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// Reopen a non-completed run for resumption (back to `running`).
  /// Completed runs are never reopened.
  async fn reopen_run(&self, run_id: &str) -> Result<(), Error>;

  /// Persist the control-flow position for crash-safe resume.
  async fn save_control_state(
    &self,
    run_id: &str,
    current_space: &str,
    current_param_set: Option<i64>,
  ) -> Result<(), Error>;

  /// Delete a run and every child record. The fresh-start cascade is the
  /// only deletion path; granular records are otherwise append-only.
  async fn delete_run_cascade(&self, run_id: &str) -> Result<(), Error>;

  /// Create a space execution record.
  async fn create_space_execution(&self, space: &SpaceExecution) -> Result<(), Error>;

  /// Get a space execution record, if it exists.
  async fn get_space_execution(
    &self,
    run_id: &str,
    space_id: &str,
  ) -> Result<Option<SpaceExecution>, Error>;

  /// Update a space execution's status.
  async fn update_space_status(
    &self,
    run_id: &str,
    space_id: &str,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// Create or resume a parameter-set execution record.
  async fn upsert_param_set_execution(&self, param_set: &ParamSetExecution) -> Result<(), Error>;

  /// Get a parameter-set execution record, if it exists.
  async fn get_param_set_execution(
    &self,
    run_id: &str,
    space_id: &str,
    index: i64,
  ) -> Result<Option<ParamSetExecution>, Error>;

  /// Update a parameter-set execution's status.
  async fn update_param_set_status(
    &self,
    run_id: &str,
    space_id: &str,
    index: i64,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// Create or resume a task execution record.
  async fn upsert_task_execution(&self, task: &TaskExecution) -> Result<(), Error>;

  /// Get a task execution record, if it exists.
  async fn get_task_execution(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    task_id: &str,
  ) -> Result<Option<TaskExecution>, Error>;

  /// Update a task execution's status and error text.
  async fn update_task_execution(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    task_id: &str,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
    error_message: Option<&str>,
  ) -> Result<(), Error>;

  /// Persist one task-output value (upsert).
  async fn put_data_mapping(&self, mapping: &DataMapping) -> Result<(), Error>;

  /// Read one task-output value, if present.
  async fn get_data_mapping(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    data_name: &str,
  ) -> Result<Option<String>, Error>;

  /// List every data mapping of one parameter set.
  async fn list_data_mappings(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
  ) -> Result<Vec<DataMapping>, Error>;

  /// Per-status space counts for a run.
  async fn space_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error>;

  /// Per-status parameter-set counts for a run.
  async fn param_set_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error>;

  /// Per-status task counts for a run.
  async fn task_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error>;

  /// Release the underlying connection pool. Safe to call more than once.
  async fn close(&self);
}
