use rand::Rng;
use serde_json::Value;

use lattice_model::{ParamSet, ParameterDefinition, ParameterKind, SpaceDefinition};
use lattice_resolver::ResolvedWorkflow;

use crate::error::SweepError;

pub const GRIDSEARCH: &str = "gridsearch";
pub const RANDOMSEARCH: &str = "randomsearch";

const DEFAULT_RANDOM_TRIALS: u32 = 10;

/// Expand a space's parameter declarations into concrete parameter sets.
///
/// When a resolved workflow is supplied, space-level definitions are filtered
/// to the parameter names actually declared by some task; task-scoped
/// definitions are always kept, namespaced as `"taskId:paramName"`.
pub fn expand_space(
  space: &SpaceDefinition,
  workflow: Option<&ResolvedWorkflow>,
  rng: &mut impl Rng,
) -> Result<Vec<ParamSet>, SweepError> {
  let candidates = collect_candidates(space, workflow)?;

  match space.strategy.as_str() {
    GRIDSEARCH => Ok(grid_product(&candidates)),
    RANDOMSEARCH => {
      let trials = space.runs.unwrap_or(DEFAULT_RANDOM_TRIALS);
      random_trials(&candidates, trials, rng)
    }
    other => Err(SweepError::UnknownStrategy {
      space: space.name.clone(),
      strategy: other.to_string(),
    }),
  }
}

/// Expand one parameter definition into its candidate value list.
pub fn expand_definition(def: &ParameterDefinition) -> Result<Vec<Value>, SweepError> {
  match def.kind {
    ParameterKind::Value => match def.values.first() {
      Some(v) => Ok(vec![v.clone()]),
      None => Err(SweepError::EmptyDefinition {
        name: def.name.clone(),
      }),
    },
    ParameterKind::Enum => Ok(def.values.clone()),
    ParameterKind::Range => expand_range(def),
  }
}

/// Named candidate lists in collection order: space-level definitions first,
/// then every task-configuration parameter.
fn collect_candidates(
  space: &SpaceDefinition,
  workflow: Option<&ResolvedWorkflow>,
) -> Result<Vec<(String, Vec<Value>)>, SweepError> {
  let mut collected = Vec::new();

  for def in &space.params {
    if let Some(workflow) = workflow {
      if !declares_param(workflow, &def.name) {
        continue;
      }
    }
    collected.push((def.name.clone(), expand_definition(def)?));
  }

  for config in &space.task_configurations {
    for def in &config.params {
      let name = format!("{}:{}", config.task, def.name);
      collected.push((name, expand_definition(def)?));
    }
  }

  Ok(collected)
}

fn declares_param(workflow: &ResolvedWorkflow, name: &str) -> bool {
  workflow
    .tasks
    .iter()
    .any(|task| task.params.iter().any(|p| p.name == name))
}

fn expand_range(def: &ParameterDefinition) -> Result<Vec<Value>, SweepError> {
  let invalid = || SweepError::InvalidRange {
    name: def.name.clone(),
  };

  if def.values.len() != 3 {
    return Err(invalid());
  }
  let min = def.values[0].as_f64().ok_or_else(invalid)?;
  let max = def.values[1].as_f64().ok_or_else(invalid)?;
  let step = def.values[2].as_f64().ok_or_else(invalid)?;
  if step <= 0.0 {
    return Err(SweepError::InvalidStep {
      name: def.name.clone(),
    });
  }

  let mut values = Vec::new();
  let mut i = 0u32;
  loop {
    let x = min + f64::from(i) * step;
    // Small epsilon so accumulated float drift cannot drop the max endpoint.
    if x > max + 1e-9 {
      break;
    }
    values.push(round4(x));
    i += 1;
  }
  Ok(values)
}

/// Round to 4 decimal places to suppress floating-point drift, collapsing
/// whole numbers back to JSON integers.
fn round4(x: f64) -> Value {
  let rounded = (x * 10_000.0).round() / 10_000.0;
  if rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
    Value::from(rounded as i64)
  } else {
    Value::from(rounded)
  }
}

/// Full cartesian product. Names expand in collection order, with the
/// last-collected name cycling fastest. Zero parameters yield exactly one
/// empty combination.
fn grid_product(candidates: &[(String, Vec<Value>)]) -> Vec<ParamSet> {
  let mut combinations = vec![ParamSet::new()];
  for (name, values) in candidates {
    let mut next = Vec::with_capacity(combinations.len() * values.len());
    for combination in &combinations {
      for value in values {
        let mut extended = combination.clone();
        extended.insert(name.clone(), value.clone());
        next.push(extended);
      }
    }
    combinations = next;
  }
  combinations
}

/// Independent uniform draws with replacement, one per parameter per trial.
fn random_trials(
  candidates: &[(String, Vec<Value>)],
  trials: u32,
  rng: &mut impl Rng,
) -> Result<Vec<ParamSet>, SweepError> {
  let mut sets = Vec::with_capacity(trials as usize);
  for _ in 0..trials {
    let mut set = ParamSet::new();
    for (name, values) in candidates {
      if values.is_empty() {
        return Err(SweepError::EmptyCandidates { name: name.clone() });
      }
      let pick = rng.gen_range(0..values.len());
      set.insert(name.clone(), values[pick].clone());
    }
    sets.push(set);
  }
  Ok(sets)
}
