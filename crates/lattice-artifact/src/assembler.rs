use std::collections::BTreeMap;

use rand::Rng;

use lattice_model::{END, ExperimentDefinition, START, TaskDefinition, Transition};
use lattice_resolver::{WorkflowResolver, WorkflowSet};
use lattice_sweep::expand_space;

use crate::artifact::{Artifact, ArtifactSpace, ArtifactTask, ControlGraph};
use crate::error::ArtifactError;
use crate::validation::{ValidationError, ValidationReport, validate_data_flow};

const DEFAULT_VERSION: &str = "1.0.0";

/// Assembles an experiment and its workflows into a compiled [`Artifact`].
///
/// Assembly runs the whole compilation pipeline: inheritance and task
/// resolution, parameter-space expansion, data-flow validation, and
/// control-graph construction. Validation violations are accumulated and
/// reported together; any violation means no artifact is emitted.
pub struct Assembler<'a> {
  workflows: &'a WorkflowSet,
}

impl<'a> Assembler<'a> {
  pub fn new(workflows: &'a WorkflowSet) -> Self {
    Self { workflows }
  }

  pub fn assemble(
    &self,
    experiment: &ExperimentDefinition,
    rng: &mut impl Rng,
  ) -> Result<Artifact, ArtifactError> {
    let resolver = WorkflowResolver::new(self.workflows);
    let table = resolver.resolve_tasks(experiment)?;

    let mut report = ValidationReport::default();
    let mut spaces = Vec::with_capacity(experiment.spaces.len());

    for space in &experiment.spaces {
      let workflow = resolver.resolve(&space.workflow)?;
      validate_data_flow(&space.name, &workflow, experiment, &mut report);

      let parameters = expand_space(space, Some(&workflow), rng)?;
      spaces.push(ArtifactSpace {
        space_id: space.name.clone(),
        tasks_order: workflow.tasks_order(),
        parameters,
      });
    }

    for (name, task) in &table {
      if task.implementation.is_none() {
        report.push(ValidationError::AbstractTask { task: name.clone() });
      }
    }

    let control = build_control(experiment, &mut report);

    if !report.is_empty() {
      return Err(ArtifactError::Validation(report));
    }

    Ok(Artifact {
      experiment: experiment.name.clone(),
      version: experiment
        .version
        .clone()
        .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
      tasks: table
        .into_iter()
        .map(|(name, task)| (name, lock_task(task)))
        .collect(),
      spaces,
      control,
    })
  }
}

/// Fold a resolved task into its artifact form: static parameters last-wins,
/// dynamic parameter names in first-declaration order.
fn lock_task(task: TaskDefinition) -> ArtifactTask {
  let mut static_parameters = BTreeMap::new();
  let mut dynamic_parameters: Vec<String> = Vec::new();

  for decl in &task.params {
    match &decl.value {
      Some(value) => {
        static_parameters.insert(decl.name.clone(), value.clone());
      }
      None => {
        if !dynamic_parameters.contains(&decl.name) {
          dynamic_parameters.push(decl.name.clone());
        }
      }
    }
  }

  ArtifactTask {
    // Abstract tasks were reported before this point.
    implementation: task.implementation.unwrap_or_default(),
    static_parameters,
    dynamic_parameters,
    inputs: task.inputs,
    outputs: task.outputs,
  }
}

/// The declared control flow verbatim, or a synthesized linear chain through
/// the spaces in declaration order when none was declared.
fn build_control(experiment: &ExperimentDefinition, report: &mut ValidationReport) -> ControlGraph {
  let transitions = match &experiment.control {
    Some(control) => control.transitions.clone(),
    None => {
      let mut transitions = Vec::with_capacity(experiment.spaces.len() + 1);
      let mut previous = START.to_string();
      for space in &experiment.spaces {
        transitions.push(Transition::new(previous, space.name.clone()));
        previous = space.name.clone();
      }
      transitions.push(Transition::new(previous, END));
      transitions
    }
  };

  for transition in &transitions {
    for space_id in [&transition.from, &transition.to] {
      let is_sentinel = space_id == START || space_id == END;
      if !is_sentinel && !experiment.spaces.iter().any(|s| &s.name == space_id) {
        report.push(ValidationError::UnknownSpace {
          space: space_id.clone(),
        });
      }
    }
  }

  let start = transitions
    .iter()
    .find(|t| t.from == START)
    .map(|t| t.to.clone());
  let start = match start {
    Some(start) => start,
    None => {
      report.push(ValidationError::MissingStart);
      String::new()
    }
  };

  ControlGraph { start, transitions }
}
