//! Concrete parameter combinations and their content hash.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// One concrete combination of swept parameter values, keyed by parameter
/// name (task-scoped names use the `"taskId:paramName"` form).
pub type ParamSet = BTreeMap<String, serde_json::Value>;

/// Content hash of a parameter set: SHA-256 over `key=value` pairs in sorted
/// key order. Independent of insertion order; sensitive to every value.
pub fn params_hash(params: &ParamSet) -> String {
  let mut hasher = Sha256::new();
  for (name, value) in params {
    hasher.update(name.as_bytes());
    hasher.update(b"=");
    hasher.update(value.to_string().as_bytes());
    hasher.update(b";");
  }
  format!("{:x}", hasher.finalize())
}

/// Render a parameter value for the subprocess argument vector. Strings are
/// passed raw (no JSON quoting); everything else uses its JSON rendering.
pub fn render_value(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
