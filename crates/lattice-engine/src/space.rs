//! Space executor: resumable, cache-aware iteration over a space's
//! parameter sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use lattice_artifact::{ArtifactSpace, ArtifactTask};
use lattice_model::params_hash;
use lattice_store::{ExecutionStatus, ParamSetExecution, RunStatus, SpaceExecution, Store};
use lattice_task_executor::{TaskExecutor, TaskInput};

use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier};

/// Executes one space of a run: every parameter set in order, every task of
/// the space's task order within each set.
pub struct SpaceExecutor<N: ExecutionNotifier> {
  store: Arc<dyn Store>,
  task_executor: TaskExecutor,
  notifier: Arc<N>,
  cancel: CancellationToken,
}

impl<N: ExecutionNotifier> SpaceExecutor<N> {
  pub fn new(
    store: Arc<dyn Store>,
    task_executor: TaskExecutor,
    notifier: Arc<N>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      store,
      task_executor,
      notifier,
      cancel,
    }
  }

  /// Execute the space. Parameter sets already marked completed are skipped
  /// wholesale; the first task failure marks its parameter set failed and
  /// aborts the space, leaving the space execution un-completed.
  #[instrument(
    name = "space_execute",
    skip(self, space, tasks),
    fields(run_id = %run_id, space_id = %space.space_id)
  )]
  pub async fn execute(
    &self,
    run_id: &str,
    space: &ArtifactSpace,
    tasks: &BTreeMap<String, ArtifactTask>,
  ) -> Result<(), EngineError> {
    // Idempotent create: a resumed run keeps the original row and with it
    // the parameter-set count the run was started with.
    let existing = self.store.get_space_execution(run_id, &space.space_id).await?;
    let total_param_sets = match existing {
      Some(row) => row.total_param_sets,
      None => {
        let total_param_sets = space.parameters.len() as i64;
        self
          .store
          .create_space_execution(&SpaceExecution {
            run_id: run_id.to_string(),
            space_id: space.space_id.clone(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            total_param_sets,
            total_tasks: space.tasks_order.len() as i64 * total_param_sets,
          })
          .await?;
        total_param_sets
      }
    };

    self.notifier.notify(ExecutionEvent::SpaceStarted {
      run_id: run_id.to_string(),
      space_id: space.space_id.clone(),
    });

    for index in 0..total_param_sets {
      if self.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      // Termination is advisory; this boundary poll is its enforcement
      // point.
      if self.store.get_run(run_id).await?.status == RunStatus::Terminated {
        return Err(EngineError::Terminated);
      }

      self
        .store
        .save_control_state(run_id, &space.space_id, Some(index))
        .await?;
      self
        .execute_param_set(run_id, space, tasks, index, total_param_sets)
        .await?;
    }

    self
      .store
      .update_space_status(
        run_id,
        &space.space_id,
        ExecutionStatus::Completed,
        Some(Utc::now()),
      )
      .await?;
    self.notifier.notify(ExecutionEvent::SpaceCompleted {
      run_id: run_id.to_string(),
      space_id: space.space_id.clone(),
    });

    Ok(())
  }

  async fn execute_param_set(
    &self,
    run_id: &str,
    space: &ArtifactSpace,
    tasks: &BTreeMap<String, ArtifactTask>,
    index: i64,
    total: i64,
  ) -> Result<(), EngineError> {
    let param_set = space
      .parameters
      .get(index as usize)
      .ok_or(EngineError::ParamSetNotFound { index })?;

    if let Some(existing) = self
      .store
      .get_param_set_execution(run_id, &space.space_id, index)
      .await?
    {
      if existing.status == ExecutionStatus::Completed {
        info!(index, "parameter set already completed, skipping");
        self.notifier.notify(ExecutionEvent::ParamSetCompleted {
          run_id: run_id.to_string(),
          space_id: space.space_id.clone(),
          index,
          total,
          cached: true,
        });
        return Ok(());
      }
    }

    self
      .store
      .upsert_param_set_execution(&ParamSetExecution {
        run_id: run_id.to_string(),
        space_id: space.space_id.clone(),
        index,
        params_hash: params_hash(param_set),
        status: ExecutionStatus::Running,
        start_time: Utc::now(),
        end_time: None,
      })
      .await?;

    for task_id in &space.tasks_order {
      let task = tasks
        .get(task_id)
        .ok_or_else(|| EngineError::TaskNotFound {
          task_id: task_id.clone(),
        })?;

      self.notifier.notify(ExecutionEvent::TaskStarted {
        run_id: run_id.to_string(),
        space_id: space.space_id.clone(),
        index,
        task_id: task_id.clone(),
      });

      let input = TaskInput {
        run_id: run_id.to_string(),
        space_id: space.space_id.clone(),
        param_set_index: index,
        task_id: task_id.clone(),
      };
      match self.task_executor.execute(&input, task, param_set).await {
        Ok(_) => {
          self.notifier.notify(ExecutionEvent::TaskCompleted {
            run_id: run_id.to_string(),
            space_id: space.space_id.clone(),
            index,
            task_id: task_id.clone(),
          });
        }
        Err(e) => {
          self
            .store
            .update_param_set_status(
              run_id,
              &space.space_id,
              index,
              ExecutionStatus::Failed,
              Some(Utc::now()),
            )
            .await?;
          self.notifier.notify(ExecutionEvent::TaskFailed {
            run_id: run_id.to_string(),
            space_id: space.space_id.clone(),
            index,
            task_id: task_id.clone(),
            error: e.to_string(),
          });
          return Err(e.into());
        }
      }
    }

    self
      .store
      .update_param_set_status(
        run_id,
        &space.space_id,
        index,
        ExecutionStatus::Completed,
        Some(Utc::now()),
      )
      .await?;
    self.notifier.notify(ExecutionEvent::ParamSetCompleted {
      run_id: run_id.to_string(),
      space_id: space.space_id.clone(),
      index,
      total,
      cached: false,
    });

    Ok(())
  }
}
