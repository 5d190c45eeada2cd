use thiserror::Error;

/// Errors that can occur during workflow and task resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// A space or resolution request referenced a workflow that does not exist.
  #[error("workflow not found: {name}")]
  MissingWorkflow { name: String },

  /// A workflow named a parent that does not exist.
  #[error("parent workflow '{parent}' of '{workflow}' not found")]
  MissingParent { workflow: String, parent: String },

  /// A workflow inherits from itself, directly or through its parent chain.
  #[error("inheritance cycle detected at workflow '{workflow}'")]
  InheritanceCycle { workflow: String },

  /// Two workflows referenced by the same experiment declare the same task
  /// name. Task identifiers are global across an experiment.
  #[error("duplicate task '{task}' declared by workflows '{first}' and '{second}'")]
  DuplicateTask {
    task: String,
    first: String,
    second: String,
  },
}
