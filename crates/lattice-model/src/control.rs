use serde::{Deserialize, Serialize};

/// Sentinel node name for the control-flow entry point.
pub const START: &str = "START";

/// Sentinel node name for the control-flow exit point.
pub const END: &str = "END";

/// The space-to-space transition graph of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlow {
  pub transitions: Vec<Transition>,
}

/// One transition. A transition without a condition is always taken; the
/// condition text is opaque to the engine and handed to a pluggable
/// evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
  pub from: String,
  pub to: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
}

impl Transition {
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      condition: None,
    }
  }
}
