//! Per-arrow and per-worker performance counters. Each is an associative
//! monoid (`merge` is commutative and associative) so the engine can
//! aggregate worker-local snapshots without a shared mutable accumulator on
//! every fire.

use std::time::Duration;

/// Lifetime counters for one arrow, merged in from every worker that ever
/// fired it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowMetrics {
    pub fire_count: u64,
    pub keep_going_count: u64,
    pub come_back_later_count: u64,
    pub error_count: u64,
    pub total_latency: Duration,
}

impl ArrowMetrics {
    pub fn record(&mut self, result_latency: Duration, outcome: Outcome) {
        self.fire_count += 1;
        self.total_latency += result_latency;
        match outcome {
            Outcome::KeepGoing => self.keep_going_count += 1,
            Outcome::ComeBackLater => self.come_back_later_count += 1,
            Outcome::Error => self.error_count += 1,
        }
    }

    pub fn merge(&mut self, other: &ArrowMetrics) {
        self.fire_count += other.fire_count;
        self.keep_going_count += other.keep_going_count;
        self.come_back_later_count += other.come_back_later_count;
        self.error_count += other.error_count;
        self.total_latency += other.total_latency;
    }

    pub fn mean_latency(&self) -> Duration {
        if self.fire_count == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.fire_count as u32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    KeepGoing,
    ComeBackLater,
    Error,
}

/// A single worker's utilisation breakdown, merged up periodically (every
/// `checkin_time`) into the engine's aggregate view.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerMetrics {
    pub useful_time: Duration,
    pub retry_time: Duration,
    pub scheduler_time: Duration,
    pub idle_time: Duration,
}

impl WorkerMetrics {
    pub fn merge(&mut self, other: &WorkerMetrics) {
        self.useful_time += other.useful_time;
        self.retry_time += other.retry_time;
        self.scheduler_time += other.scheduler_time;
        self.idle_time += other.idle_time;
    }

    pub fn total_time(&self) -> Duration {
        self.useful_time + self.retry_time + self.scheduler_time + self.idle_time
    }

    pub fn utilisation(&self) -> f64 {
        let total = self.total_time();
        if total.is_zero() {
            0.0
        } else {
            self.useful_time.as_secs_f64() / total.as_secs_f64()
        }
    }
}
