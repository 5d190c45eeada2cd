//! Lattice Artifact
//!
//! This crate provides the compiled artifact representation for lattice.
//! An artifact is the validated, flattened form of an experiment — a global
//! task table, per-space task order and parameter combinations, and the
//! control-flow transition graph — ready to be executed by the engine.
//!
//! Key differences from the definition models in `lattice-model`:
//! - Workflow inheritance is resolved away (one flat task table)
//! - Parameter spaces are expanded to concrete combinations
//! - Data flow is validated (every input is satisfiable)
//! - The control graph has an explicit START space
//!
//! Artifacts serialize to a single JSON document and carry a SHA-256
//! content hash for drift bookkeeping on resumed runs.

mod artifact;
mod assembler;
mod error;
mod validation;

pub use artifact::{Artifact, ArtifactSpace, ArtifactTask, ControlGraph};
pub use assembler::Assembler;
pub use error::ArtifactError;
pub use validation::{ValidationError, ValidationReport};
