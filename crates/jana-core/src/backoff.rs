//! Worker idle-backoff contract. Concrete strategies (constant, linear,
//! exponential) live in the policies crate, which only needs this trait.

use std::time::Duration;

/// How long a worker should sleep after `attempt` consecutive empty
/// assignments, capped by the engine regardless of strategy (§4.9).
pub trait BackoffStrategy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Duration;
}
