//! Lattice Model
//!
//! This crate contains the serializable definition types for lattice.
//! These types represent workflows and experiments after parsing — the
//! grammar that produces them lives outside this repository; JSON is the
//! interchange form.
//!
//! Definitions can be loaded from:
//! - JSON project files (via CLI with `lattice compile project.json`)
//! - Embedding applications that construct them directly
//!
//! The compiler takes these definition types, resolves workflow inheritance,
//! expands parameter spaces, and assembles them into an executable artifact.

mod control;
mod experiment;
mod params;
mod project;
mod workflow;

pub use control::{ControlFlow, END, START, Transition};
pub use experiment::{
  ExperimentDefinition, ParameterDefinition, ParameterKind, SpaceDefinition,
  SpaceTaskConfiguration,
};
pub use params::{ParamSet, params_hash, render_value};
pub use project::Project;
pub use workflow::{ParamDecl, TaskConfiguration, TaskDefinition, WorkflowDefinition};
