use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lattice_model::{ParamSet, Transition};

use crate::error::ArtifactError;

/// The compiled, serializable execution plan. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
  pub experiment: String,
  pub version: String,
  pub tasks: BTreeMap<String, ArtifactTask>,
  pub spaces: Vec<ArtifactSpace>,
  pub control: ControlGraph,
}

/// One resolved task in the global task table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactTask {
  /// Path to the external implementation subprocess.
  pub implementation: String,

  /// Last-wins fold of the task's parameter declarations that carry values.
  #[serde(rename = "staticParameters", default)]
  pub static_parameters: BTreeMap<String, serde_json::Value>,

  /// Declared parameter names without static values, resolved from the
  /// parameter set at execution time.
  #[serde(rename = "dynamicParameters", default)]
  pub dynamic_parameters: Vec<String>,

  #[serde(default)]
  pub inputs: Vec<String>,

  #[serde(default)]
  pub outputs: Vec<String>,
}

/// One expanded parameter space: the task execution order paired with every
/// concrete parameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpace {
  #[serde(rename = "spaceId")]
  pub space_id: String,

  #[serde(rename = "tasksOrder")]
  pub tasks_order: Vec<String>,

  pub parameters: Vec<ParamSet>,
}

/// The space-to-space transition graph, with the entry space resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlGraph {
  #[serde(rename = "START")]
  pub start: String,

  pub transitions: Vec<Transition>,
}

impl Artifact {
  /// Look up a space by id.
  pub fn space(&self, space_id: &str) -> Option<&ArtifactSpace> {
    self.spaces.iter().find(|s| s.space_id == space_id)
  }

  /// Total task invocations the plan describes, across all spaces.
  pub fn total_tasks(&self) -> u64 {
    self
      .spaces
      .iter()
      .map(|s| s.tasks_order.len() as u64 * s.parameters.len() as u64)
      .sum()
  }

  /// SHA-256 over the canonical JSON rendering. Key order is stable
  /// (sorted maps), so the hash is independent of how the artifact was
  /// produced or re-serialized.
  pub fn content_hash(&self) -> String {
    let bytes = serde_json::to_vec(self).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
  }

  /// Load and structurally validate an artifact file. Malformed input is
  /// rejected here, before any run record is created.
  pub async fn load(path: &Path) -> Result<Self, ArtifactError> {
    let content = tokio::fs::read_to_string(path).await?;
    let artifact: Artifact =
      serde_json::from_str(&content).map_err(|source| ArtifactError::Parse { source })?;
    artifact.validate_structure()?;
    Ok(artifact)
  }

  /// Write the artifact as pretty-printed JSON.
  pub async fn save(&self, path: &Path) -> Result<(), ArtifactError> {
    let content =
      serde_json::to_string_pretty(self).map_err(|source| ArtifactError::Parse { source })?;
    tokio::fs::write(path, content).await?;
    Ok(())
  }

  fn validate_structure(&self) -> Result<(), ArtifactError> {
    let invalid = |message: &str| ArtifactError::Invalid {
      message: message.to_string(),
    };

    if self.experiment.is_empty() {
      return Err(invalid("experiment name is empty"));
    }
    if self.version.is_empty() {
      return Err(invalid("version is empty"));
    }
    if self.control.start.is_empty() {
      return Err(invalid("control.START is empty"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn minimal_artifact() -> Artifact {
    let mut tasks = BTreeMap::new();
    tasks.insert(
      "train".to_string(),
      ArtifactTask {
        implementation: "bin/train.sh".to_string(),
        static_parameters: BTreeMap::new(),
        dynamic_parameters: vec!["lr".to_string()],
        inputs: Vec::new(),
        outputs: vec!["model".to_string()],
      },
    );
    Artifact {
      experiment: "exp".to_string(),
      version: "1.0.0".to_string(),
      tasks,
      spaces: vec![ArtifactSpace {
        space_id: "s1".to_string(),
        tasks_order: vec!["train".to_string()],
        parameters: vec![[("lr".to_string(), json!(0.1))].into_iter().collect()],
      }],
      control: ControlGraph {
        start: "s1".to_string(),
        transitions: vec![Transition::new("START", "s1"), Transition::new("s1", "END")],
      },
    }
  }

  #[test]
  fn content_hash_is_stable_across_reserialization() {
    let artifact = minimal_artifact();
    let round_tripped: Artifact =
      serde_json::from_str(&serde_json::to_string(&artifact).unwrap()).unwrap();
    assert_eq!(artifact.content_hash(), round_tripped.content_hash());
  }

  #[test]
  fn wire_format_uses_the_documented_key_names() {
    let value = serde_json::to_value(minimal_artifact()).unwrap();
    assert!(value["control"]["START"].is_string());
    assert!(value["spaces"][0]["spaceId"].is_string());
    assert!(value["spaces"][0]["tasksOrder"].is_array());
    assert!(value["tasks"]["train"]["staticParameters"].is_object());
    assert!(value["tasks"]["train"]["dynamicParameters"].is_array());
  }

  #[tokio::test]
  async fn load_rejects_an_artifact_missing_control_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifact.json");
    let mut value = serde_json::to_value(minimal_artifact()).unwrap();
    value["control"].as_object_mut().unwrap().remove("START");
    std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    let result = Artifact::load(&path).await;
    assert!(matches!(result, Err(ArtifactError::Parse { .. })));
  }

  #[tokio::test]
  async fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifact.json");
    let artifact = minimal_artifact();
    artifact.save(&path).await.unwrap();
    let loaded = Artifact::load(&path).await.unwrap();
    assert_eq!(artifact, loaded);
  }
}
