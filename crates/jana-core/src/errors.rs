//! Error types raised by the core engine.

use thiserror::Error;

/// Errors the core can raise. `TryAgain` is deliberately absent — it is
/// represented as [`crate::arrow::FireResult::ComeBackLater`], a cooperative
/// signal handled entirely inside the scheduler/worker loop, never an error.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("component init failed: plugin={plugin}, component={component}: {source}")]
    ComponentInitFailure {
        plugin: String,
        component: String,
        source: String,
    },

    #[error("component execution failed: plugin={plugin}, component={component}, event={event_id}: {source}")]
    ComponentExecutionFailure {
        plugin: String,
        component: String,
        event_id: u64,
        source: String,
    },

    #[error("worker heartbeat timeout exceeded")]
    Timeout,

    #[error("infinite recursion detected in call graph: {cycle:?}")]
    InfiniteRecursion { cycle: Vec<String> },

    #[error("Insert called after Get on the same key: {key}")]
    AlreadyProduced { key: String },

    #[error("Scale requested before topology was drained")]
    NotDrained,

    #[error("queue is full (location {location})")]
    QueueFull { location: usize },

    #[error("internal engine error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
