use thiserror::Error;

/// Configuration errors raised during parameter-space expansion. All of
/// these are fatal before any execution starts.
#[derive(Debug, Error)]
pub enum SweepError {
  /// The space named a strategy this engine does not implement.
  #[error("unknown strategy '{strategy}' for space '{space}'")]
  UnknownStrategy { space: String, strategy: String },

  /// A range definition did not carry exactly three numeric values.
  #[error("range parameter '{name}' requires exactly three numeric values (min, max, step)")]
  InvalidRange { name: String },

  /// A range step must move the sequence forward.
  #[error("range parameter '{name}' has a non-positive step")]
  InvalidStep { name: String },

  /// A value definition declared no values at all.
  #[error("parameter '{name}' declares no values")]
  EmptyDefinition { name: String },

  /// Random search cannot draw from a parameter with no candidates.
  #[error("parameter '{name}' has no candidates to sample from")]
  EmptyCandidates { name: String },
}
