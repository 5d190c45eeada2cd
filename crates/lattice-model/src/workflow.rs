use serde::{Deserialize, Serialize};

/// A reusable workflow definition: an ordered set of tasks with declared
/// data dependencies and an optional parent to inherit from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
  pub name: String,

  /// Parent workflow to inherit tasks, data and the task chain from.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,

  #[serde(default)]
  pub tasks: Vec<TaskDefinition>,

  /// Local task-configuration overrides, applied by task name during
  /// inheritance resolution.
  #[serde(default)]
  pub task_configurations: Vec<TaskConfiguration>,

  /// Data declarations visible to every task in this workflow.
  #[serde(default)]
  pub data: Vec<String>,

  /// Ordered task-execution chain. The START/END sentinels are implied and
  /// not stored; an empty chain falls back to task declaration order.
  #[serde(default)]
  pub task_chain: Vec<String>,
}

/// One unit of work: static/dynamic parameters, inputs, outputs and an
/// external implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
  pub name: String,

  /// Path to the external implementation. A task without one anywhere in
  /// its inheritance chain is abstract and fails validation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub implementation: Option<String>,

  /// Parameter declarations. The list may contain the same name more than
  /// once after configuration merging; later entries take precedence.
  #[serde(default)]
  pub params: Vec<ParamDecl>,

  #[serde(default)]
  pub inputs: Vec<String>,

  #[serde(default)]
  pub outputs: Vec<String>,
}

/// A parameter declaration: a name with an optional static value.
/// Declarations without a value are dynamic and resolved from the swept
/// parameter set at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<serde_json::Value>,
}

/// A task-configuration override, targeting a task by name.
///
/// Merge rule: `implementation` replaces when present, `params` are appended
/// (never deduplicated), and `inputs`/`outputs` wholesale-replace the task's
/// lists only when non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfiguration {
  pub task: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub implementation: Option<String>,

  #[serde(default)]
  pub params: Vec<ParamDecl>,

  #[serde(default)]
  pub inputs: Vec<String>,

  #[serde(default)]
  pub outputs: Vec<String>,
}
