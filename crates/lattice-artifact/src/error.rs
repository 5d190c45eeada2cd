use thiserror::Error;

use lattice_resolver::ResolveError;
use lattice_sweep::SweepError;

use crate::validation::ValidationReport;

/// Errors from artifact assembly, loading and saving.
#[derive(Debug, Error)]
pub enum ArtifactError {
  /// Workflow or task resolution failed.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// Parameter-space expansion failed (configuration error).
  #[error(transparent)]
  Sweep(#[from] SweepError),

  /// Structural validation found one or more violations. No partial
  /// artifact is emitted.
  #[error("artifact validation failed:\n{0}")]
  Validation(ValidationReport),

  /// The artifact file is not structurally valid.
  #[error("invalid artifact: {message}")]
  Invalid { message: String },

  /// The artifact file could not be parsed.
  #[error("failed to parse artifact: {source}")]
  Parse {
    #[source]
    source: serde_json::Error,
  },

  /// An I/O error while reading or writing the artifact file.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
