use std::collections::BTreeMap;

use lattice_model::{
  END, ExperimentDefinition, START, TaskConfiguration, TaskDefinition, WorkflowDefinition,
};

use crate::error::ResolveError;

/// An indexed collection of workflow definitions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSet {
  workflows: BTreeMap<String, WorkflowDefinition>,
}

impl WorkflowSet {
  pub fn new(workflows: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
    Self {
      workflows: workflows.into_iter().map(|w| (w.name.clone(), w)).collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
    self.workflows.get(name)
  }
}

/// A workflow with its inheritance chain and task-configuration overrides
/// folded in. Ready for expansion, validation and artifact assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWorkflow {
  pub name: String,
  pub tasks: Vec<TaskDefinition>,
  pub data: Vec<String>,
  pub task_chain: Vec<String>,
}

impl ResolvedWorkflow {
  /// The concrete task-execution order: the declared chain stripped of the
  /// START/END sentinels, falling back to task declaration order when no
  /// chain was declared anywhere in the inheritance chain.
  pub fn tasks_order(&self) -> Vec<String> {
    if self.task_chain.is_empty() {
      self.tasks.iter().map(|t| t.name.clone()).collect()
    } else {
      self
        .task_chain
        .iter()
        .filter(|id| id.as_str() != START && id.as_str() != END)
        .cloned()
        .collect()
    }
  }

  /// Look up a resolved task by name.
  pub fn get_task(&self, name: &str) -> Option<&TaskDefinition> {
    self.tasks.iter().find(|t| t.name == name)
  }
}

/// Resolves workflows against a [`WorkflowSet`].
pub struct WorkflowResolver<'a> {
  set: &'a WorkflowSet,
}

impl<'a> WorkflowResolver<'a> {
  pub fn new(set: &'a WorkflowSet) -> Self {
    Self { set }
  }

  /// Resolve one workflow: fold the parent chain and local overrides into a
  /// concrete task set.
  pub fn resolve(&self, name: &str) -> Result<ResolvedWorkflow, ResolveError> {
    self.resolve_inner(name, &mut Vec::new())
  }

  fn resolve_inner(
    &self,
    name: &str,
    seen: &mut Vec<String>,
  ) -> Result<ResolvedWorkflow, ResolveError> {
    if seen.iter().any(|s| s == name) {
      return Err(ResolveError::InheritanceCycle {
        workflow: name.to_string(),
      });
    }

    let workflow = self
      .set
      .get(name)
      .ok_or_else(|| ResolveError::MissingWorkflow {
        name: name.to_string(),
      })?;

    seen.push(name.to_string());
    let resolved = match &workflow.parent {
      None => {
        let mut tasks = workflow.tasks.clone();
        apply_configurations(&mut tasks, &workflow.task_configurations);
        ResolvedWorkflow {
          name: workflow.name.clone(),
          tasks,
          data: workflow.data.clone(),
          task_chain: workflow.task_chain.clone(),
        }
      }
      Some(parent) => {
        let base = self.resolve_inner(parent, seen).map_err(|e| match e {
          ResolveError::MissingWorkflow { name: missing } if missing == *parent => {
            ResolveError::MissingParent {
              workflow: workflow.name.clone(),
              parent: parent.clone(),
            }
          }
          other => other,
        })?;

        let ResolvedWorkflow {
          mut tasks,
          mut data,
          task_chain: parent_chain,
          ..
        } = base;

        // Local overrides act on the parent's resolved tasks, then any task
        // declared locally is added (a redeclared name replaces the parent's
        // entry in place).
        apply_configurations(&mut tasks, &workflow.task_configurations);
        for task in &workflow.tasks {
          match tasks.iter_mut().find(|t| t.name == task.name) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
          }
        }

        data.extend(workflow.data.iter().cloned());
        let task_chain = if workflow.task_chain.is_empty() {
          parent_chain
        } else {
          workflow.task_chain.clone()
        };

        ResolvedWorkflow {
          name: workflow.name.clone(),
          tasks,
          data,
          task_chain,
        }
      }
    };
    seen.pop();

    Ok(resolved)
  }

  /// Flatten every workflow referenced by the experiment's spaces into one
  /// global task table. Duplicate task names across distinct workflows are
  /// an error.
  pub fn resolve_tasks(
    &self,
    experiment: &ExperimentDefinition,
  ) -> Result<BTreeMap<String, TaskDefinition>, ResolveError> {
    let mut referenced: Vec<&str> = Vec::new();
    for space in &experiment.spaces {
      if !referenced.contains(&space.workflow.as_str()) {
        referenced.push(&space.workflow);
      }
    }

    let mut table: BTreeMap<String, TaskDefinition> = BTreeMap::new();
    let mut owners: BTreeMap<String, String> = BTreeMap::new();

    for workflow_name in referenced {
      let resolved = self.resolve(workflow_name)?;
      for task in resolved.tasks {
        if let Some(first) = owners.get(&task.name) {
          if first.as_str() != workflow_name {
            return Err(ResolveError::DuplicateTask {
              task: task.name,
              first: first.clone(),
              second: workflow_name.to_string(),
            });
          }
          continue;
        }
        owners.insert(task.name.clone(), workflow_name.to_string());
        table.insert(task.name.clone(), task);
      }
    }

    Ok(table)
  }
}

/// Apply task-configuration overrides onto a resolved task list, by task
/// name. Unknown target names are ignored.
fn apply_configurations(tasks: &mut [TaskDefinition], configurations: &[TaskConfiguration]) {
  for config in configurations {
    let Some(task) = tasks.iter_mut().find(|t| t.name == config.task) else {
      continue;
    };
    if config.implementation.is_some() {
      task.implementation = config.implementation.clone();
    }
    task.params.extend(config.params.iter().cloned());
    if !config.inputs.is_empty() {
      task.inputs = config.inputs.clone();
    }
    if !config.outputs.is_empty() {
      task.outputs = config.outputs.clone();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use lattice_model::{ExperimentDefinition, ParamDecl, SpaceDefinition};
  use serde_json::json;

  fn task(name: &str, implementation: Option<&str>) -> TaskDefinition {
    TaskDefinition {
      name: name.to_string(),
      implementation: implementation.map(str::to_string),
      params: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
    }
  }

  fn workflow(name: &str, parent: Option<&str>, tasks: Vec<TaskDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
      name: name.to_string(),
      parent: parent.map(str::to_string),
      tasks,
      task_configurations: Vec::new(),
      data: Vec::new(),
      task_chain: Vec::new(),
    }
  }

  fn space(name: &str, workflow: &str) -> SpaceDefinition {
    SpaceDefinition {
      name: name.to_string(),
      workflow: workflow.to_string(),
      strategy: "gridsearch".to_string(),
      params: Vec::new(),
      task_configurations: Vec::new(),
      runs: None,
    }
  }

  fn experiment(spaces: Vec<SpaceDefinition>) -> ExperimentDefinition {
    ExperimentDefinition {
      name: "exp".to_string(),
      version: None,
      spaces,
      data: Vec::new(),
      control: None,
    }
  }

  #[test]
  fn resolves_base_workflow_with_configuration_overrides() {
    let mut train = task("train", None);
    train.params.push(ParamDecl {
      name: "epochs".to_string(),
      value: Some(json!(5)),
    });
    train.inputs = vec!["dataset".to_string()];

    let mut wf = workflow("ml", None, vec![train]);
    wf.task_configurations.push(TaskConfiguration {
      task: "train".to_string(),
      implementation: Some("bin/train.sh".to_string()),
      params: vec![ParamDecl {
        name: "epochs".to_string(),
        value: Some(json!(10)),
      }],
      inputs: Vec::new(),
      outputs: vec!["model".to_string()],
    });

    let set = WorkflowSet::new([wf]);
    let resolved = WorkflowResolver::new(&set).resolve("ml").unwrap();

    let train = resolved.get_task("train").unwrap();
    assert_eq!(train.implementation.as_deref(), Some("bin/train.sh"));
    // Appended, not deduped: both declarations survive, later wins downstream.
    assert_eq!(train.params.len(), 2);
    assert_eq!(train.params[1].value, Some(json!(10)));
    // Empty override list leaves inputs untouched; non-empty replaces outputs.
    assert_eq!(train.inputs, vec!["dataset".to_string()]);
    assert_eq!(train.outputs, vec!["model".to_string()]);
  }

  #[test]
  fn child_inherits_parent_tasks_and_appends_local_ones() {
    let parent = workflow(
      "base",
      None,
      vec![task("prepare", Some("bin/prepare.sh")), task("train", None)],
    );
    let mut child = workflow("tuned", Some("base"), vec![task("report", Some("bin/report.sh"))]);
    child.task_configurations.push(TaskConfiguration {
      task: "train".to_string(),
      implementation: Some("bin/train-fast.sh".to_string()),
      params: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
    });

    let set = WorkflowSet::new([parent, child]);
    let resolved = WorkflowResolver::new(&set).resolve("tuned").unwrap();

    let names: Vec<&str> = resolved.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["prepare", "train", "report"]);
    assert_eq!(
      resolved.get_task("train").unwrap().implementation.as_deref(),
      Some("bin/train-fast.sh")
    );
  }

  #[test]
  fn child_data_concatenates_parent_then_local() {
    let mut parent = workflow("base", None, vec![task("t", Some("t.sh"))]);
    parent.data = vec!["corpus".to_string()];
    let mut child = workflow("tuned", Some("base"), Vec::new());
    child.data = vec!["labels".to_string()];

    let set = WorkflowSet::new([parent, child]);
    let resolved = WorkflowResolver::new(&set).resolve("tuned").unwrap();

    assert_eq!(resolved.data, vec!["corpus".to_string(), "labels".to_string()]);
  }

  #[test]
  fn child_inherits_task_chain_unless_it_declares_its_own() {
    let mut parent = workflow("base", None, vec![task("a", Some("a.sh")), task("b", Some("b.sh"))]);
    parent.task_chain = vec![
      "START".to_string(),
      "a".to_string(),
      "b".to_string(),
      "END".to_string(),
    ];
    let inheriting = workflow("inherits", Some("base"), Vec::new());
    let mut overriding = workflow("overrides", Some("base"), Vec::new());
    overriding.task_chain = vec!["b".to_string(), "a".to_string()];

    let set = WorkflowSet::new([parent, inheriting, overriding]);
    let resolver = WorkflowResolver::new(&set);

    assert_eq!(
      resolver.resolve("inherits").unwrap().tasks_order(),
      vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(
      resolver.resolve("overrides").unwrap().tasks_order(),
      vec!["b".to_string(), "a".to_string()]
    );
  }

  #[test]
  fn sibling_resolution_does_not_contaminate_the_parent() {
    let parent = workflow("base", None, vec![task("train", Some("train.sh"))]);
    let mut child_a = workflow("a", Some("base"), Vec::new());
    child_a.task_configurations.push(TaskConfiguration {
      task: "train".to_string(),
      implementation: None,
      params: vec![ParamDecl {
        name: "lr".to_string(),
        value: Some(json!(0.1)),
      }],
      inputs: Vec::new(),
      outputs: Vec::new(),
    });
    let child_b = workflow("b", Some("base"), Vec::new());

    let set = WorkflowSet::new([parent, child_a, child_b]);
    let resolver = WorkflowResolver::new(&set);

    let a = resolver.resolve("a").unwrap();
    assert_eq!(a.get_task("train").unwrap().params.len(), 1);

    // Resolving `a` first must not leak its override into `b`.
    let b = resolver.resolve("b").unwrap();
    assert!(b.get_task("train").unwrap().params.is_empty());
  }

  #[test]
  fn missing_parent_is_an_error() {
    let child = workflow("orphan", Some("ghost"), Vec::new());
    let set = WorkflowSet::new([child]);
    let result = WorkflowResolver::new(&set).resolve("orphan");
    assert!(matches!(result, Err(ResolveError::MissingParent { .. })));
  }

  #[test]
  fn inheritance_cycle_is_an_error() {
    let mut a = workflow("a", Some("b"), Vec::new());
    a.tasks.push(task("t", Some("t.sh")));
    let b = workflow("b", Some("a"), Vec::new());
    let set = WorkflowSet::new([a, b]);
    let result = WorkflowResolver::new(&set).resolve("a");
    assert!(matches!(result, Err(ResolveError::InheritanceCycle { .. })));
  }

  #[test]
  fn task_table_flattens_all_referenced_workflows() {
    let wf1 = workflow("prep", None, vec![task("fetch", Some("fetch.sh"))]);
    let wf2 = workflow("ml", None, vec![task("train", Some("train.sh"))]);
    let set = WorkflowSet::new([wf1, wf2]);
    let exp = experiment(vec![space("s1", "prep"), space("s2", "ml")]);

    let table = WorkflowResolver::new(&set).resolve_tasks(&exp).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.contains_key("fetch"));
    assert!(table.contains_key("train"));
  }

  #[test]
  fn duplicate_task_names_across_workflows_fail_loudly() {
    let wf1 = workflow("one", None, vec![task("train", Some("a.sh"))]);
    let wf2 = workflow("two", None, vec![task("train", Some("b.sh"))]);
    let set = WorkflowSet::new([wf1, wf2]);
    let exp = experiment(vec![space("s1", "one"), space("s2", "two")]);

    let result = WorkflowResolver::new(&set).resolve_tasks(&exp);
    assert!(matches!(result, Err(ResolveError::DuplicateTask { .. })));
  }

  #[test]
  fn same_workflow_in_two_spaces_is_not_a_duplicate() {
    let wf = workflow("ml", None, vec![task("train", Some("train.sh"))]);
    let set = WorkflowSet::new([wf]);
    let exp = experiment(vec![space("s1", "ml"), space("s2", "ml")]);

    let table = WorkflowResolver::new(&set).resolve_tasks(&exp).unwrap();
    assert_eq!(table.len(), 1);
  }
}
