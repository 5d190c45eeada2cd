use serde::{Deserialize, Serialize};

use crate::experiment::ExperimentDefinition;
use crate::workflow::WorkflowDefinition;

/// A complete compilation input: every workflow referenced by the experiment
/// plus the experiment itself. This is the serialized-AST document consumed
/// by `lattice compile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  #[serde(default)]
  pub workflows: Vec<WorkflowDefinition>,
  pub experiment: ExperimentDefinition,
}
