use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::types::{
  DataMapping, ExecutionStatus, ParamSetExecution, Run, RunStatus, SpaceExecution, TaskExecution,
};
use crate::{Error, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) a store at the given file path.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;
    Ok(Self::new(pool))
  }

  /// Open an in-memory store. Used by tests and one-shot dry runs.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::new().in_memory(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_run(&self, run: &Run) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO runs (id, experiment_name, experiment_version, artifact_path, artifact_hash,
                              status, start_time, end_time, current_space, current_param_set)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.experiment_name)
        .bind(&run.experiment_version)
        .bind(&run.artifact_path)
        .bind(&run.artifact_hash)
        .bind(run.status)
        .bind(run.start_time)
        .bind(run.end_time)
        .bind(&run.current_space)
        .bind(run.current_param_set)
        .execute(&self.pool)
        .await?;

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<Run, Error> {
    sqlx::query_as(
      r#"
            SELECT id, experiment_name, experiment_version, artifact_path, artifact_hash,
                   status, start_time, end_time, current_space, current_param_set
            FROM runs
            WHERE id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
  }

  async fn find_run(&self, experiment: &str, version: &str) -> Result<Option<Run>, Error> {
    let run = sqlx::query_as(
      r#"
            SELECT id, experiment_name, experiment_version, artifact_path, artifact_hash,
                   status, start_time, end_time, current_space, current_param_set
            FROM runs
            WHERE experiment_name = ? AND experiment_version = ?
            "#,
    )
    .bind(experiment)
    .bind(version)
    .fetch_optional(&self.pool)
    .await?;

    Ok(run)
  }

  async fn update_run_status(
    &self,
    run_id: &str,
    status: RunStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE runs
            SET status = ?, end_time = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed', 'terminated')
            "#,
    )
    .bind(status)
    .bind(end_time)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      let run = self.get_run(run_id).await?;
      return Err(Error::TerminalRun {
        run_id: run_id.to_string(),
        status: run.status,
      });
    }
    Ok(())
  }

  async fn reopen_run(&self, run_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE runs
            SET status = 'running', end_time = NULL
            WHERE id = ? AND status <> 'completed'
            "#,
    )
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      let run = self.get_run(run_id).await?;
      return Err(Error::TerminalRun {
        run_id: run_id.to_string(),
        status: run.status,
      });
    }
    Ok(())
  }

  async fn save_control_state(
    &self,
    run_id: &str,
    current_space: &str,
    current_param_set: Option<i64>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE runs
            SET current_space = ?, current_param_set = ?
            WHERE id = ?
            "#,
    )
    .bind(current_space)
    .bind(current_param_set)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn delete_run_cascade(&self, run_id: &str) -> Result<(), Error> {
    for table in [
      "data_mappings",
      "task_executions",
      "param_set_executions",
      "space_executions",
    ] {
      sqlx::query(&format!("DELETE FROM {table} WHERE run_id = ?"))
        .bind(run_id)
        .execute(&self.pool)
        .await?;
    }
    sqlx::query("DELETE FROM runs WHERE id = ?")
      .bind(run_id)
      .execute(&self.pool)
      .await?;

    Ok(())
  }

  async fn create_space_execution(&self, space: &SpaceExecution) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO space_executions (run_id, space_id, status, start_time, end_time,
                                          total_param_sets, total_tasks)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&space.run_id)
    .bind(&space.space_id)
    .bind(space.status)
    .bind(space.start_time)
    .bind(space.end_time)
    .bind(space.total_param_sets)
    .bind(space.total_tasks)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_space_execution(
    &self,
    run_id: &str,
    space_id: &str,
  ) -> Result<Option<SpaceExecution>, Error> {
    let space = sqlx::query_as(
      r#"
            SELECT run_id, space_id, status, start_time, end_time, total_param_sets, total_tasks
            FROM space_executions
            WHERE run_id = ? AND space_id = ?
            "#,
    )
    .bind(run_id)
    .bind(space_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(space)
  }

  async fn update_space_status(
    &self,
    run_id: &str,
    space_id: &str,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE space_executions
            SET status = ?, end_time = ?
            WHERE run_id = ? AND space_id = ?
            "#,
    )
    .bind(status)
    .bind(end_time)
    .bind(run_id)
    .bind(space_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn upsert_param_set_execution(&self, param_set: &ParamSetExecution) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO param_set_executions (run_id, space_id, param_set_index, params_hash,
                                              status, start_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (run_id, space_id, param_set_index)
            DO UPDATE SET status = excluded.status, params_hash = excluded.params_hash,
                          end_time = excluded.end_time
            "#,
    )
    .bind(&param_set.run_id)
    .bind(&param_set.space_id)
    .bind(param_set.index)
    .bind(&param_set.params_hash)
    .bind(param_set.status)
    .bind(param_set.start_time)
    .bind(param_set.end_time)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_param_set_execution(
    &self,
    run_id: &str,
    space_id: &str,
    index: i64,
  ) -> Result<Option<ParamSetExecution>, Error> {
    let param_set = sqlx::query_as(
      r#"
            SELECT run_id, space_id, param_set_index, params_hash, status, start_time, end_time
            FROM param_set_executions
            WHERE run_id = ? AND space_id = ? AND param_set_index = ?
            "#,
    )
    .bind(run_id)
    .bind(space_id)
    .bind(index)
    .fetch_optional(&self.pool)
    .await?;

    Ok(param_set)
  }

  async fn update_param_set_status(
    &self,
    run_id: &str,
    space_id: &str,
    index: i64,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE param_set_executions
            SET status = ?, end_time = ?
            WHERE run_id = ? AND space_id = ? AND param_set_index = ?
            "#,
    )
    .bind(status)
    .bind(end_time)
    .bind(run_id)
    .bind(space_id)
    .bind(index)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn upsert_task_execution(&self, task: &TaskExecution) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO task_executions (run_id, space_id, param_set_index, task_id,
                                         status, start_time, end_time, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (run_id, space_id, param_set_index, task_id)
            DO UPDATE SET status = excluded.status, start_time = excluded.start_time,
                          end_time = excluded.end_time, error_message = excluded.error_message
            "#,
    )
    .bind(&task.run_id)
    .bind(&task.space_id)
    .bind(task.param_set_index)
    .bind(&task.task_id)
    .bind(task.status)
    .bind(task.start_time)
    .bind(task.end_time)
    .bind(&task.error_message)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_task_execution(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    task_id: &str,
  ) -> Result<Option<TaskExecution>, Error> {
    let task = sqlx::query_as(
      r#"
            SELECT run_id, space_id, param_set_index, task_id, status, start_time, end_time,
                   error_message
            FROM task_executions
            WHERE run_id = ? AND space_id = ? AND param_set_index = ? AND task_id = ?
            "#,
    )
    .bind(run_id)
    .bind(space_id)
    .bind(param_set_index)
    .bind(task_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(task)
  }

  async fn update_task_execution(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    task_id: &str,
    status: ExecutionStatus,
    end_time: Option<DateTime<Utc>>,
    error_message: Option<&str>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE task_executions
            SET status = ?, end_time = ?, error_message = ?
            WHERE run_id = ? AND space_id = ? AND param_set_index = ? AND task_id = ?
            "#,
    )
    .bind(status)
    .bind(end_time)
    .bind(error_message)
    .bind(run_id)
    .bind(space_id)
    .bind(param_set_index)
    .bind(task_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn put_data_mapping(&self, mapping: &DataMapping) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO data_mappings (run_id, space_id, param_set_index, data_name, data_value)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (run_id, space_id, param_set_index, data_name)
            DO UPDATE SET data_value = excluded.data_value
            "#,
    )
    .bind(&mapping.run_id)
    .bind(&mapping.space_id)
    .bind(mapping.param_set_index)
    .bind(&mapping.data_name)
    .bind(&mapping.data_value)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_data_mapping(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
    data_name: &str,
  ) -> Result<Option<String>, Error> {
    let value = sqlx::query_scalar(
      r#"
            SELECT data_value
            FROM data_mappings
            WHERE run_id = ? AND space_id = ? AND param_set_index = ? AND data_name = ?
            "#,
    )
    .bind(run_id)
    .bind(space_id)
    .bind(param_set_index)
    .bind(data_name)
    .fetch_optional(&self.pool)
    .await?;

    Ok(value)
  }

  async fn list_data_mappings(
    &self,
    run_id: &str,
    space_id: &str,
    param_set_index: i64,
  ) -> Result<Vec<DataMapping>, Error> {
    let mappings = sqlx::query_as(
      r#"
            SELECT run_id, space_id, param_set_index, data_name, data_value
            FROM data_mappings
            WHERE run_id = ? AND space_id = ? AND param_set_index = ?
            ORDER BY data_name ASC
            "#,
    )
    .bind(run_id)
    .bind(space_id)
    .bind(param_set_index)
    .fetch_all(&self.pool)
    .await?;

    Ok(mappings)
  }

  async fn space_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error> {
    self.status_counts("space_executions", run_id).await
  }

  async fn param_set_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error> {
    self.status_counts("param_set_executions", run_id).await
  }

  async fn task_status_counts(&self, run_id: &str) -> Result<BTreeMap<String, i64>, Error> {
    self.status_counts("task_executions", run_id).await
  }

  async fn close(&self) {
    self.pool.close().await;
  }
}

impl SqliteStore {
  async fn status_counts(&self, table: &str, run_id: &str) -> Result<BTreeMap<String, i64>, Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
      "SELECT status, COUNT(*) FROM {table} WHERE run_id = ? GROUP BY status"
    ))
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn store() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store
  }

  fn run(id: &str) -> Run {
    Run {
      id: id.to_string(),
      experiment_name: "exp".to_string(),
      experiment_version: "1.0.0".to_string(),
      artifact_path: "artifact.json".to_string(),
      artifact_hash: "abc".to_string(),
      status: RunStatus::Running,
      start_time: Utc::now(),
      end_time: None,
      current_space: Some("s1".to_string()),
      current_param_set: None,
    }
  }

  #[tokio::test]
  async fn create_find_and_update_a_run() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();

    let found = store.find_run("exp", "1.0.0").await.unwrap().unwrap();
    assert_eq!(found.id, "r1");
    assert_eq!(found.status, RunStatus::Running);

    store
      .update_run_status("r1", RunStatus::Completed, Some(Utc::now()))
      .await
      .unwrap();
    let completed = store.get_run("r1").await.unwrap();
    assert_eq!(completed.status, RunStatus::Completed);
    assert!(completed.end_time.is_some());
  }

  #[tokio::test]
  async fn terminal_runs_refuse_further_transitions() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();
    store
      .update_run_status("r1", RunStatus::Terminated, Some(Utc::now()))
      .await
      .unwrap();

    let result = store
      .update_run_status("r1", RunStatus::Failed, Some(Utc::now()))
      .await;
    assert!(matches!(result, Err(Error::TerminalRun { .. })));
  }

  #[tokio::test]
  async fn reopen_restores_a_failed_run_but_never_a_completed_one() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();
    store
      .update_run_status("r1", RunStatus::Failed, Some(Utc::now()))
      .await
      .unwrap();

    store.reopen_run("r1").await.unwrap();
    assert_eq!(store.get_run("r1").await.unwrap().status, RunStatus::Running);

    store
      .update_run_status("r1", RunStatus::Completed, Some(Utc::now()))
      .await
      .unwrap();
    assert!(matches!(
      store.reopen_run("r1").await,
      Err(Error::TerminalRun { .. })
    ));
  }

  #[tokio::test]
  async fn cascade_delete_removes_all_child_records() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();
    store
      .create_space_execution(&SpaceExecution {
        run_id: "r1".to_string(),
        space_id: "s1".to_string(),
        status: ExecutionStatus::Running,
        start_time: Utc::now(),
        end_time: None,
        total_param_sets: 2,
        total_tasks: 4,
      })
      .await
      .unwrap();
    store
      .put_data_mapping(&DataMapping {
        run_id: "r1".to_string(),
        space_id: "s1".to_string(),
        param_set_index: 0,
        data_name: "model".to_string(),
        data_value: "weights.bin".to_string(),
      })
      .await
      .unwrap();

    store.delete_run_cascade("r1").await.unwrap();

    assert!(store.find_run("exp", "1.0.0").await.unwrap().is_none());
    assert!(
      store
        .get_space_execution("r1", "s1")
        .await
        .unwrap()
        .is_none()
    );
    assert!(
      store
        .get_data_mapping("r1", "s1", 0, "model")
        .await
        .unwrap()
        .is_none()
    );
  }

  #[tokio::test]
  async fn param_set_upsert_is_idempotent_on_resume() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();

    let mut param_set = ParamSetExecution {
      run_id: "r1".to_string(),
      space_id: "s1".to_string(),
      index: 0,
      params_hash: "h1".to_string(),
      status: ExecutionStatus::Running,
      start_time: Utc::now(),
      end_time: None,
    };
    store.upsert_param_set_execution(&param_set).await.unwrap();
    // A second upsert after a crash resumes the same row.
    param_set.params_hash = "h2".to_string();
    store.upsert_param_set_execution(&param_set).await.unwrap();

    let row = store
      .get_param_set_execution("r1", "s1", 0)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(row.params_hash, "h2");
    assert_eq!(row.status, ExecutionStatus::Running);
  }

  #[tokio::test]
  async fn status_counts_group_by_status() {
    let store = store().await;
    store.create_run(&run("r1")).await.unwrap();
    for (index, status) in [
      ExecutionStatus::Completed,
      ExecutionStatus::Completed,
      ExecutionStatus::Failed,
    ]
    .into_iter()
    .enumerate()
    {
      store
        .upsert_task_execution(&TaskExecution {
          run_id: "r1".to_string(),
          space_id: "s1".to_string(),
          param_set_index: index as i64,
          task_id: "train".to_string(),
          status,
          start_time: Utc::now(),
          end_time: None,
          error_message: None,
        })
        .await
        .unwrap();
    }

    let counts = store.task_status_counts("r1").await.unwrap();
    assert_eq!(counts.get("completed"), Some(&2));
    assert_eq!(counts.get("failed"), Some(&1));
  }
}
