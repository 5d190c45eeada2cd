//! Task executor implementation.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, instrument};

use lattice_artifact::ArtifactTask;
use lattice_model::{ParamSet, render_value};
use lattice_store::{DataMapping, ExecutionStatus, Store, TaskExecution};

use crate::error::TaskExecutionError;
use crate::output::parse_output_line;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(3600);

/// Identifies the execution unit a task invocation belongs to.
#[derive(Debug, Clone)]
pub struct TaskInput {
  pub run_id: String,
  pub space_id: String,
  pub param_set_index: i64,
  pub task_id: String,
}

/// Executes tasks against their external implementations.
pub struct TaskExecutor {
  store: Arc<dyn Store>,
  deadline: Duration,
}

impl TaskExecutor {
  /// Create a new task executor with the default subprocess deadline.
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self {
      store,
      deadline: DEFAULT_DEADLINE,
    }
  }

  /// Override the subprocess deadline.
  pub fn with_deadline(store: Arc<dyn Store>, deadline: Duration) -> Self {
    Self { store, deadline }
  }

  /// Execute one task for one parameter set.
  ///
  /// A task whose execution record is already `completed` returns its
  /// persisted outputs without invoking the implementation again.
  #[instrument(
    name = "task_execute",
    skip(self, task, param_set),
    fields(
      run_id = %input.run_id,
      space_id = %input.space_id,
      param_set_index = input.param_set_index,
      task_id = %input.task_id,
    )
  )]
  pub async fn execute(
    &self,
    input: &TaskInput,
    task: &ArtifactTask,
    param_set: &ParamSet,
  ) -> Result<BTreeMap<String, String>, TaskExecutionError> {
    if let Some(existing) = self
      .store
      .get_task_execution(
        &input.run_id,
        &input.space_id,
        input.param_set_index,
        &input.task_id,
      )
      .await?
    {
      if existing.status == ExecutionStatus::Completed {
        info!("task already completed, returning cached outputs");
        return self.cached_outputs(input, task).await;
      }
    }

    let params = effective_parameters(&input.task_id, task, param_set);
    let inputs = self.resolve_inputs(input, task).await?;

    self
      .store
      .upsert_task_execution(&TaskExecution {
        run_id: input.run_id.clone(),
        space_id: input.space_id.clone(),
        param_set_index: input.param_set_index,
        task_id: input.task_id.clone(),
        status: ExecutionStatus::Running,
        start_time: Utc::now(),
        end_time: None,
        error_message: None,
      })
      .await?;

    info!(implementation = %task.implementation, "task started");
    let result = self.invoke(task, &params, &inputs).await;

    match result {
      Ok(outputs) => {
        for (name, value) in &outputs {
          self
            .store
            .put_data_mapping(&DataMapping {
              run_id: input.run_id.clone(),
              space_id: input.space_id.clone(),
              param_set_index: input.param_set_index,
              data_name: name.clone(),
              data_value: value.clone(),
            })
            .await?;
        }
        self
          .store
          .update_task_execution(
            &input.run_id,
            &input.space_id,
            input.param_set_index,
            &input.task_id,
            ExecutionStatus::Completed,
            Some(Utc::now()),
            None,
          )
          .await?;
        info!("task completed");
        Ok(outputs)
      }
      Err(e) => {
        self
          .store
          .update_task_execution(
            &input.run_id,
            &input.space_id,
            input.param_set_index,
            &input.task_id,
            ExecutionStatus::Failed,
            Some(Utc::now()),
            Some(&e.to_string()),
          )
          .await?;
        error!(error = %e, "task failed");
        Err(e)
      }
    }
  }

  /// Read the declared outputs of a completed task back from the store.
  async fn cached_outputs(
    &self,
    input: &TaskInput,
    task: &ArtifactTask,
  ) -> Result<BTreeMap<String, String>, TaskExecutionError> {
    let mut outputs = BTreeMap::new();
    for name in &task.outputs {
      if let Some(value) = self
        .store
        .get_data_mapping(&input.run_id, &input.space_id, input.param_set_index, name)
        .await?
      {
        outputs.insert(name.clone(), value);
      }
    }
    Ok(outputs)
  }

  /// Resolve declared inputs from data mappings, falling back to the literal
  /// input name for externally seeded values.
  async fn resolve_inputs(
    &self,
    input: &TaskInput,
    task: &ArtifactTask,
  ) -> Result<Vec<String>, TaskExecutionError> {
    let mut resolved = Vec::with_capacity(task.inputs.len());
    for name in &task.inputs {
      let value = self
        .store
        .get_data_mapping(&input.run_id, &input.space_id, input.param_set_index, name)
        .await?
        .unwrap_or_else(|| name.clone());
      resolved.push(value);
    }
    Ok(resolved)
  }

  /// Spawn the implementation and parse its output protocol.
  async fn invoke(
    &self,
    task: &ArtifactTask,
    params: &[(String, String)],
    inputs: &[String],
  ) -> Result<BTreeMap<String, String>, TaskExecutionError> {
    let mut command = Command::new(&task.implementation);
    for (name, value) in params {
      command.arg(format!("--{name}")).arg(value);
    }
    if !inputs.is_empty() {
      command.arg(inputs.join(","));
    }
    command
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let output = timeout(self.deadline, command.output())
      .await
      .map_err(|_| TaskExecutionError::Timeout {
        seconds: self.deadline.as_secs(),
      })?
      .map_err(|source| TaskExecutionError::Spawn {
        implementation: task.implementation.clone(),
        source,
      })?;

    if !output.status.success() {
      let code = output.status.code().unwrap_or(-1);
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(TaskExecutionError::NonZeroExit { code, stderr });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_output_line(&stdout, &task.outputs)
  }
}

/// The effective parameter vector: static parameters overlaid with each
/// dynamic name resolved from the parameter set — the task-scoped
/// `"taskId:name"` entry first, the bare name second.
fn effective_parameters(
  task_id: &str,
  task: &ArtifactTask,
  param_set: &ParamSet,
) -> Vec<(String, String)> {
  let mut params: Vec<(String, String)> = task
    .static_parameters
    .iter()
    .map(|(name, value)| (name.clone(), render_value(value)))
    .collect();

  for name in &task.dynamic_parameters {
    let scoped = format!("{task_id}:{name}");
    let Some(value) = param_set.get(&scoped).or_else(|| param_set.get(name)) else {
      continue;
    };
    let rendered = render_value(value);
    match params.iter_mut().find(|(n, _)| n == name) {
      Some(existing) => existing.1 = rendered,
      None => params.push((name.clone(), rendered)),
    }
  }

  params
}
