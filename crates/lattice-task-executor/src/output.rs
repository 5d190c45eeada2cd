//! The implementation output protocol.
//!
//! An implementation prints one line to stdout: a comma-separated,
//! optionally double-quote-wrapped list of output values, positionally
//! aligned with the task's declared output names. Extra stdout lines are
//! ignored; fewer values than declared outputs is fatal.

use std::collections::BTreeMap;

use crate::error::TaskExecutionError;

/// Parse the first stdout line against the declared output names.
pub fn parse_output_line(
  stdout: &str,
  outputs: &[String],
) -> Result<BTreeMap<String, String>, TaskExecutionError> {
  if outputs.is_empty() {
    return Ok(BTreeMap::new());
  }

  let line = stdout.lines().next().unwrap_or("");
  let values: Vec<&str> = if line.trim().is_empty() {
    Vec::new()
  } else {
    line.split(',').map(|v| unquote(v.trim())).collect()
  };

  let mut resolved = BTreeMap::new();
  for (position, name) in outputs.iter().enumerate() {
    match values.get(position) {
      Some(value) => {
        resolved.insert(name.clone(), (*value).to_string());
      }
      None => {
        return Err(TaskExecutionError::MissingOutput { name: name.clone() });
      }
    }
  }
  Ok(resolved)
}

fn unquote(value: &str) -> &str {
  value
    .strip_prefix('"')
    .and_then(|v| v.strip_suffix('"'))
    .unwrap_or(value)
}
