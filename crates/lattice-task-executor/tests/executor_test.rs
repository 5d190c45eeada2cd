//! Integration tests for the task executor using real subprocess scripts.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use lattice_artifact::ArtifactTask;
use lattice_model::ParamSet;
use lattice_store::{
  DataMapping, ExecutionStatus, Run, RunStatus, SqliteStore, Store, TaskExecution,
};
use lattice_task_executor::{TaskExecutionError, TaskExecutor, TaskInput};

async fn store() -> Arc<SqliteStore> {
  let store = SqliteStore::in_memory().await.expect("in-memory store");
  store.migrate().await.expect("migrations");
  store
    .create_run(&Run {
      id: "r1".to_string(),
      experiment_name: "exp".to_string(),
      experiment_version: "1.0.0".to_string(),
      artifact_path: "artifact.json".to_string(),
      artifact_hash: "hash".to_string(),
      status: RunStatus::Running,
      start_time: Utc::now(),
      end_time: None,
      current_space: Some("s1".to_string()),
      current_param_set: None,
    })
    .await
    .expect("run row");
  Arc::new(store)
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
  let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(&path, perms).expect("chmod");
  path
}

fn task(implementation: &Path, inputs: &[&str], outputs: &[&str]) -> ArtifactTask {
  ArtifactTask {
    implementation: implementation.to_string_lossy().into_owned(),
    static_parameters: BTreeMap::new(),
    dynamic_parameters: Vec::new(),
    inputs: inputs.iter().map(|s| s.to_string()).collect(),
    outputs: outputs.iter().map(|s| s.to_string()).collect(),
  }
}

fn input(task_id: &str) -> TaskInput {
  TaskInput {
    run_id: "r1".to_string(),
    space_id: "s1".to_string(),
    param_set_index: 0,
    task_id: task_id.to_string(),
  }
}

#[tokio::test]
async fn successful_task_persists_outputs_and_completes() {
  let store = store().await;
  let dir = tempfile::tempdir().expect("tempdir");
  let script = write_script(dir.path(), "train.sh", r#"echo "model.bin,0.93""#);
  let task = task(&script, &[], &["model", "accuracy"]);

  let executor = TaskExecutor::new(store.clone());
  let outputs = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect("task succeeds");

  assert_eq!(outputs["model"], "model.bin");
  assert_eq!(outputs["accuracy"], "0.93");

  let row = store
    .get_task_execution("r1", "s1", 0, "train")
    .await
    .unwrap()
    .expect("task row");
  assert_eq!(row.status, ExecutionStatus::Completed);

  let persisted = store
    .get_data_mapping("r1", "s1", 0, "model")
    .await
    .unwrap();
  assert_eq!(persisted.as_deref(), Some("model.bin"));
}

#[tokio::test]
async fn argument_vector_is_params_then_joined_inputs() {
  let store = store().await;
  let dir = tempfile::tempdir().expect("tempdir");
  let args_file = dir.path().join("args.txt");
  let script = write_script(
    dir.path(),
    "echo-args.sh",
    &format!(r#"echo "$@" > {}; echo done"#, args_file.display()),
  );

  let mut task = task(&script, &["dataset", "labels"], &["result"]);
  task
    .static_parameters
    .insert("optimizer".to_string(), json!("adam"));
  task.dynamic_parameters.push("lr".to_string());

  // Upstream output for 'dataset'; 'labels' falls back to its literal name.
  store
    .put_data_mapping(&DataMapping {
      run_id: "r1".to_string(),
      space_id: "s1".to_string(),
      param_set_index: 0,
      data_name: "dataset".to_string(),
      data_value: "prepared.csv".to_string(),
    })
    .await
    .unwrap();

  let param_set: ParamSet = [("train:lr".to_string(), json!(0.1))].into_iter().collect();
  let executor = TaskExecutor::new(store.clone());
  executor
    .execute(&input("train"), &task, &param_set)
    .await
    .expect("task succeeds");

  let args = std::fs::read_to_string(&args_file).expect("args captured");
  assert_eq!(args.trim(), "--optimizer adam --lr 0.1 prepared.csv,labels");
}

#[tokio::test]
async fn non_zero_exit_surfaces_stderr_and_marks_the_row_failed() {
  let store = store().await;
  let dir = tempfile::tempdir().expect("tempdir");
  let script = write_script(dir.path(), "boom.sh", "echo boom >&2\nexit 1");
  let task = task(&script, &[], &["result"]);

  let executor = TaskExecutor::new(store.clone());
  let err = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect_err("task fails");

  assert_eq!(err.to_string(), "Task failed with exit code 1: boom");

  let row = store
    .get_task_execution("r1", "s1", 0, "train")
    .await
    .unwrap()
    .expect("task row");
  assert_eq!(row.status, ExecutionStatus::Failed);
  assert_eq!(
    row.error_message.as_deref(),
    Some("Task failed with exit code 1: boom")
  );
}

#[tokio::test]
async fn insufficient_outputs_are_fatal() {
  let store = store().await;
  let dir = tempfile::tempdir().expect("tempdir");
  let script = write_script(dir.path(), "short.sh", "echo only-one");
  let task = task(&script, &[], &["first", "second"]);

  let executor = TaskExecutor::new(store.clone());
  let err = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect_err("task fails");

  assert_eq!(
    err.to_string(),
    "Missing output for 'second' or insufficient outputs returned"
  );
}

#[tokio::test]
async fn completed_tasks_return_cached_outputs_without_spawning() {
  let store = store().await;
  store
    .upsert_task_execution(&TaskExecution {
      run_id: "r1".to_string(),
      space_id: "s1".to_string(),
      param_set_index: 0,
      task_id: "train".to_string(),
      status: ExecutionStatus::Completed,
      start_time: Utc::now(),
      end_time: Some(Utc::now()),
      error_message: None,
    })
    .await
    .unwrap();
  store
    .put_data_mapping(&DataMapping {
      run_id: "r1".to_string(),
      space_id: "s1".to_string(),
      param_set_index: 0,
      data_name: "model".to_string(),
      data_value: "cached.bin".to_string(),
    })
    .await
    .unwrap();

  // The implementation path does not exist; a spawn attempt would fail.
  let task = task(Path::new("/nonexistent/implementation"), &[], &["model"]);
  let executor = TaskExecutor::new(store.clone());
  let outputs = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect("cache hit");

  assert_eq!(outputs["model"], "cached.bin");
}

#[tokio::test]
async fn spawn_failure_is_reported_and_persisted() {
  let store = store().await;
  let task = task(Path::new("/nonexistent/implementation"), &[], &["result"]);

  let executor = TaskExecutor::new(store.clone());
  let err = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect_err("spawn fails");

  assert!(matches!(err, TaskExecutionError::Spawn { .. }));
  let row = store
    .get_task_execution("r1", "s1", 0, "train")
    .await
    .unwrap()
    .expect("task row");
  assert_eq!(row.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn deadline_kills_a_hung_implementation() {
  let store = store().await;
  let dir = tempfile::tempdir().expect("tempdir");
  let script = write_script(dir.path(), "hang.sh", "sleep 30\necho done");
  let task = task(&script, &[], &["result"]);

  let executor = TaskExecutor::with_deadline(store.clone(), std::time::Duration::from_millis(200));
  let err = executor
    .execute(&input("train"), &task, &ParamSet::new())
    .await
    .expect_err("deadline fires");

  assert!(matches!(err, TaskExecutionError::Timeout { .. }));
}
