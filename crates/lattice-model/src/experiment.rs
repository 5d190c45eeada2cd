use serde::{Deserialize, Serialize};

use crate::control::ControlFlow;

/// An experiment: a set of parameter-sweep spaces over workflows plus the
/// control flow between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
  pub name: String,

  /// Artifact version recorded on run rows for drift bookkeeping.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default)]
  pub spaces: Vec<SpaceDefinition>,

  /// Data declarations visible to every space in this experiment.
  #[serde(default)]
  pub data: Vec<String>,

  /// Space-to-space transitions. When absent, a linear chain through the
  /// spaces in declaration order is synthesized at assembly.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub control: Option<ControlFlow>,
}

/// One workflow instantiated under a sweep strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceDefinition {
  pub name: String,

  /// Name of the workflow this space sweeps over.
  pub workflow: String,

  /// Sweep strategy: `gridsearch` or `randomsearch`. Kept as a raw string so
  /// an unknown strategy surfaces as a configuration error at expansion time
  /// rather than failing to deserialize.
  pub strategy: String,

  /// Space-level parameter definitions.
  #[serde(default)]
  pub params: Vec<ParameterDefinition>,

  /// Parameter overrides scoped to a single task, namespaced as
  /// `"taskId:paramName"` during expansion.
  #[serde(default)]
  pub task_configurations: Vec<SpaceTaskConfiguration>,

  /// Trial count for `randomsearch` (default 10). Ignored by `gridsearch`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub runs: Option<u32>,
}

/// Sweep parameter overrides for one task within a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceTaskConfiguration {
  pub task: String,
  #[serde(default)]
  pub params: Vec<ParameterDefinition>,
}

/// A sweep specification for one parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
  pub name: String,
  pub kind: ParameterKind,

  /// Literal value list. `value` uses the first entry only, `enum` uses all
  /// entries verbatim, `range` requires exactly (min, max, step).
  #[serde(default)]
  pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
  Enum,
  Range,
  Value,
}
