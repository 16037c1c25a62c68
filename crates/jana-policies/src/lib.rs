//! jana-policies: worker idle-backoff strategies.
//!
//! The core only depends on the [`jana_core::BackoffStrategy`] trait; this
//! crate supplies the concrete strategies named in spec.md §4.9 (constant,
//! linear, exponential), each capped regardless of the curve it follows.

use std::time::Duration;

use jana_core::BackoffStrategy;
use serde::{Deserialize, Serialize};

/// Sleeps the same duration after every empty assignment.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Sleeps `base * attempt`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    base: Duration,
    max: Duration,
}

impl LinearBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        (self.base * attempt.max(1)).min(self.max)
    }
}

/// Sleeps `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.max(1).saturating_sub(1).min(20);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        self.base.checked_mul(factor as u32).unwrap_or(self.max).min(self.max)
    }
}

/// Which backoff curve an `EngineConfig`-adjacent parameter store selects,
/// along with its tunables — mirrors how the rest of this workspace encodes
/// a named policy choice plus parameters (e.g. `chem-policies::SelectionParams`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Constant { delay_millis: u64 },
    Linear { base_millis: u64, cap_millis: u64 },
    Exponential { base_millis: u64, cap_millis: u64 },
}

impl BackoffPolicy {
    pub fn build(self) -> Box<dyn BackoffStrategy> {
        match self {
            BackoffPolicy::Constant { delay_millis } => Box::new(ConstantBackoff::new(Duration::from_millis(delay_millis))),
            BackoffPolicy::Linear { base_millis, cap_millis } => {
                Box::new(LinearBackoff::new(Duration::from_millis(base_millis), Duration::from_millis(cap_millis)))
            }
            BackoffPolicy::Exponential { base_millis, cap_millis } => {
                Box::new(ExponentialBackoff::new(Duration::from_millis(base_millis), Duration::from_millis(cap_millis)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_then_caps() {
        let b = LinearBackoff::new(Duration::from_millis(10), Duration::from_millis(35));
        assert_eq!(b.next_delay(1), Duration::from_millis(10));
        assert_eq!(b.next_delay(2), Duration::from_millis(20));
        assert_eq!(b.next_delay(10), Duration::from_millis(35));
    }

    #[test]
    fn exponential_backoff_doubles_then_caps() {
        let b = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(50));
        assert_eq!(b.next_delay(1), Duration::from_millis(5));
        assert_eq!(b.next_delay(2), Duration::from_millis(10));
        assert_eq!(b.next_delay(3), Duration::from_millis(20));
        assert_eq!(b.next_delay(10), Duration::from_millis(50));
    }

    #[test]
    fn constant_backoff_ignores_attempt() {
        let b = ConstantBackoff::new(Duration::from_millis(7));
        assert_eq!(b.next_delay(1), b.next_delay(50));
    }

    #[test]
    fn backoff_policy_builds_matching_strategy() {
        let policy = BackoffPolicy::Constant { delay_millis: 3 };
        let strat = policy.build();
        assert_eq!(strat.next_delay(1), Duration::from_millis(3));
    }
}
