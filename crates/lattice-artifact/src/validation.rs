//! Structural validation of experiments before artifact assembly.
//!
//! Violations are accumulated into a [`ValidationReport`] rather than thrown
//! one at a time, so callers can report every problem in a single pre-flight
//! pass with no side effects. Any violation blocks assembly.

use std::collections::BTreeSet;
use std::fmt;

use lattice_model::ExperimentDefinition;
use lattice_resolver::ResolvedWorkflow;

/// One structural violation found during validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
  /// A task input is satisfied neither by an upstream output nor by a data
  /// declaration visible at workflow or experiment scope.
  UnsatisfiedInput {
    space: String,
    task: String,
    input: String,
  },

  /// A task has no implementation anywhere in its inheritance chain.
  AbstractTask { task: String },

  /// The task chain references a task the workflow does not declare.
  UnknownChainTask { workflow: String, task: String },

  /// The declared control flow has no transition out of START.
  MissingStart,

  /// A control-flow transition references a space that does not exist.
  UnknownSpace { space: String },
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnsatisfiedInput { space, task, input } => write!(
        f,
        "input '{input}' of task '{task}' in space '{space}' is not satisfied by any upstream output or data declaration"
      ),
      Self::AbstractTask { task } => {
        write!(f, "task '{task}' is abstract (no implementation)")
      }
      Self::UnknownChainTask { workflow, task } => write!(
        f,
        "task chain of workflow '{workflow}' references unknown task '{task}'"
      ),
      Self::MissingStart => write!(f, "control flow has no transition out of START"),
      Self::UnknownSpace { space } => {
        write!(f, "control flow references unknown space '{space}'")
      }
    }
  }
}

/// Accumulated validation violations. Empty means the experiment is valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
  pub errors: Vec<ValidationError>,
}

impl ValidationReport {
  pub fn push(&mut self, error: ValidationError) {
    self.errors.push(error);
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }
}

impl fmt::Display for ValidationReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for error in &self.errors {
      writeln!(f, "  - {error}")?;
    }
    Ok(())
  }
}

/// Validate the data flow of one space's workflow: walking the task chain in
/// order, every declared input must be satisfied by an earlier task's output
/// or by a data declaration at workflow or experiment scope.
pub(crate) fn validate_data_flow(
  space_id: &str,
  workflow: &ResolvedWorkflow,
  experiment: &ExperimentDefinition,
  report: &mut ValidationReport,
) {
  let mut available: BTreeSet<&str> = BTreeSet::new();
  available.extend(workflow.data.iter().map(String::as_str));
  available.extend(experiment.data.iter().map(String::as_str));

  for task_id in workflow.tasks_order() {
    let Some(task) = workflow.get_task(&task_id) else {
      report.push(ValidationError::UnknownChainTask {
        workflow: workflow.name.clone(),
        task: task_id.clone(),
      });
      continue;
    };

    for input in &task.inputs {
      if !available.contains(input.as_str()) {
        report.push(ValidationError::UnsatisfiedInput {
          space: space_id.to_string(),
          task: task.name.clone(),
          input: input.clone(),
        });
      }
    }

    available.extend(task.outputs.iter().map(String::as_str));
  }
}
