//! Lattice Engine
//!
//! This crate executes compiled artifacts. The engine walks the control-flow
//! graph from START to END, executing one space at a time, one parameter set
//! at a time, one task at a time — strictly sequential within a run.
//!
//! Every boundary is persisted through the store before the loop advances,
//! so a crashed run resumes at the interrupted space and parameter set with
//! completed work skipped, not repeated. Cancellation and termination are
//! observed at parameter-set boundaries.

mod control;
mod error;
mod events;
mod run;
mod space;

pub use control::{ConditionEvaluator, ControlFlowRuntime, RejectingEvaluator, RunContext};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use run::{Orchestrator, RunOptions, RunOutcome, RunSummary};
pub use space::SpaceExecutor;
