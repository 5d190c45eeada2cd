//! Lattice Sweep
//!
//! This crate turns a space's parameter declarations into the list of
//! concrete parameter-value combinations the engine will execute.
//!
//! Candidate lists come from the space-level parameter definitions (filtered
//! against the resolved workflow's declared parameter names when resolution
//! context is available) and from per-task configuration parameters,
//! namespaced as `"taskId:paramName"`.
//!
//! Strategies: `gridsearch` takes the full cartesian product; `randomsearch`
//! draws a fixed number of independent trials from an injected RNG, so runs
//! are reproducible for a given seed.

mod error;
mod expander;

pub use error::SweepError;
pub use expander::{GRIDSEARCH, RANDOMSEARCH, expand_definition, expand_space};
