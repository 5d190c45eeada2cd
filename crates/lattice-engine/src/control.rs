//! Control-flow runtime: space-to-space transitions and the pluggable
//! condition-evaluation seam.

use std::sync::Arc;

use async_trait::async_trait;

use lattice_model::{END, Transition};
use lattice_store::Store;

use crate::error::EngineError;

/// Run-scoped context handed to condition evaluators.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id: String,
  pub experiment_name: String,
  pub experiment_version: String,
  pub current_space: String,
}

/// Evaluates opaque condition text against a run context.
///
/// The engine defines no expression grammar of its own; embedders inject an
/// evaluator that understands their condition language.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
  async fn evaluate(&self, condition: &str, ctx: &RunContext) -> Result<bool, EngineError>;
}

/// The default evaluator: transitions without condition text always pass,
/// and any non-empty condition is rejected loudly rather than guessed at.
#[derive(Debug, Clone, Default)]
pub struct RejectingEvaluator;

#[async_trait]
impl ConditionEvaluator for RejectingEvaluator {
  async fn evaluate(&self, condition: &str, _ctx: &RunContext) -> Result<bool, EngineError> {
    if condition.trim().is_empty() {
      Ok(true)
    } else {
      Err(EngineError::UnsupportedCondition {
        condition: condition.to_string(),
      })
    }
  }
}

/// Holds the transition graph and selects the next space for a run.
pub struct ControlFlowRuntime {
  transitions: Vec<Transition>,
  evaluator: Arc<dyn ConditionEvaluator>,
}

impl ControlFlowRuntime {
  pub fn new(transitions: Vec<Transition>, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
    Self {
      transitions,
      evaluator,
    }
  }

  /// Select the next space id: transitions out of `current` are scanned in
  /// declared order, a conditional transition is taken when its condition
  /// evaluates true, an unconditional one always. No matching transition
  /// means END.
  pub async fn next_space(&self, current: &str, ctx: &RunContext) -> Result<String, EngineError> {
    for transition in self.transitions.iter().filter(|t| t.from == current) {
      match &transition.condition {
        None => return Ok(transition.to.clone()),
        Some(condition) => {
          if self.evaluator.evaluate(condition, ctx).await? {
            return Ok(transition.to.clone());
          }
        }
      }
    }
    Ok(END.to_string())
  }

  /// Persist the control-flow position so a crash resumes at this space.
  pub async fn save_state(
    &self,
    store: &dyn Store,
    run_id: &str,
    current_space: &str,
  ) -> Result<(), EngineError> {
    store.save_control_state(run_id, current_space, None).await?;
    Ok(())
  }

  /// Restore the persisted control-flow position for a run.
  pub async fn get_state(
    &self,
    store: &dyn Store,
    run_id: &str,
  ) -> Result<Option<String>, EngineError> {
    Ok(store.get_run(run_id).await?.current_space)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> RunContext {
    RunContext {
      run_id: "r1".to_string(),
      experiment_name: "exp".to_string(),
      experiment_version: "1.0.0".to_string(),
      current_space: "s1".to_string(),
    }
  }

  fn conditional(from: &str, to: &str, condition: &str) -> Transition {
    Transition {
      from: from.to_string(),
      to: to.to_string(),
      condition: Some(condition.to_string()),
    }
  }

  /// Evaluator that accepts exactly the condition text `"go"`.
  struct GoEvaluator;

  #[async_trait]
  impl ConditionEvaluator for GoEvaluator {
    async fn evaluate(&self, condition: &str, _ctx: &RunContext) -> Result<bool, EngineError> {
      Ok(condition == "go")
    }
  }

  #[tokio::test]
  async fn unconditional_transition_is_taken() {
    let runtime = ControlFlowRuntime::new(
      vec![Transition::new("s1", "s2")],
      Arc::new(RejectingEvaluator),
    );
    assert_eq!(runtime.next_space("s1", &ctx()).await.unwrap(), "s2");
  }

  #[tokio::test]
  async fn no_matching_transition_means_end() {
    let runtime = ControlFlowRuntime::new(
      vec![Transition::new("s1", "s2")],
      Arc::new(RejectingEvaluator),
    );
    assert_eq!(runtime.next_space("s2", &ctx()).await.unwrap(), END);
  }

  #[tokio::test]
  async fn first_passing_conditional_wins_with_unconditional_fallback() {
    let runtime = ControlFlowRuntime::new(
      vec![
        conditional("s1", "retry", "stop"),
        conditional("s1", "s2", "go"),
        Transition::new("s1", "fallback"),
      ],
      Arc::new(GoEvaluator),
    );
    assert_eq!(runtime.next_space("s1", &ctx()).await.unwrap(), "s2");
  }

  #[tokio::test]
  async fn failed_conditions_fall_through_to_the_unconditional_transition() {
    let runtime = ControlFlowRuntime::new(
      vec![
        conditional("s1", "retry", "stop"),
        Transition::new("s1", "fallback"),
      ],
      Arc::new(GoEvaluator),
    );
    assert_eq!(runtime.next_space("s1", &ctx()).await.unwrap(), "fallback");
  }

  #[tokio::test]
  async fn default_evaluator_rejects_condition_text() {
    let runtime = ControlFlowRuntime::new(
      vec![conditional("s1", "s2", "accuracy > 0.9")],
      Arc::new(RejectingEvaluator),
    );
    let result = runtime.next_space("s1", &ctx()).await;
    assert!(matches!(
      result,
      Err(EngineError::UnsupportedCondition { .. })
    ));
  }
}
