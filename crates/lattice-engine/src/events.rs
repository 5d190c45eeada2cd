//! Execution events and notifiers for observability.
//!
//! Events are emitted as a run progresses so consumers can observe progress,
//! stream to UIs, or mirror state elsewhere. The durable record lives in the
//! store; notifiers are strictly additive.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started (fresh or resumed).
  RunStarted { run_id: String, experiment: String },

  /// A space has started executing.
  SpaceStarted { run_id: String, space_id: String },

  /// A space has completed: every parameter set succeeded.
  SpaceCompleted { run_id: String, space_id: String },

  /// A parameter set finished. `cached` marks sets skipped wholesale
  /// because a previous attempt already completed them.
  ParamSetCompleted {
    run_id: String,
    space_id: String,
    index: i64,
    total: i64,
    cached: bool,
  },

  /// A task invocation has started.
  TaskStarted {
    run_id: String,
    space_id: String,
    index: i64,
    task_id: String,
  },

  /// A task invocation has completed successfully.
  TaskCompleted {
    run_id: String,
    space_id: String,
    index: i64,
    task_id: String,
  },

  /// A task invocation has failed.
  TaskFailed {
    run_id: String,
    space_id: String,
    index: i64,
    task_id: String,
    error: String,
  },

  /// The run has completed successfully.
  RunCompleted { run_id: String },

  /// The run has failed.
  RunFailed { run_id: String, error: String },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event - implementations decide what to
/// do with them (broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Use this when events need to be consumed asynchronously. The channel is
/// unbounded so a slow consumer never blocks the engine; event volume is one
/// per task/parameter-set boundary, so memory growth is unlikely in
/// practice.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
