use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jana_core::{EngineError, EngineResult, Event, Processor};

/// An "expert" processor (§6): `process_parallel` does the CPU-bound work
/// unlocked, `process_sequential` only bumps a visit counter — demonstrating
/// the split the framework uses to let compute run fully in parallel while
/// still offering a serialised section for the rare per-event bookkeeping
/// that needs it (e.g. a shared histogram fill).
pub struct PassThroughProcessor {
    name: String,
    busy_work: Duration,
    visits: AtomicU64,
    reentrant_guard: AtomicBool,
}

impl PassThroughProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            busy_work: Duration::ZERO,
            visits: AtomicU64::new(0),
            reentrant_guard: AtomicBool::new(false),
        }
    }

    pub fn with_busy_work(mut self, busy_work: Duration) -> Self {
        self.busy_work = busy_work;
        self
    }

    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Acquire)
    }
}

impl Processor for PassThroughProcessor {
    fn process_parallel(&self, _event: &Event) -> EngineResult<()> {
        if !self.busy_work.is_zero() {
            let start = Instant::now();
            while start.elapsed() < self.busy_work {
                std::hint::spin_loop();
            }
        }
        Ok(())
    }

    fn process_sequential(&self, _event: &Event) -> EngineResult<()> {
        if self.reentrant_guard.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Internal(format!(
                "{}: sequential section entered concurrently",
                self.name
            )));
        }
        self.visits.fetch_add(1, Ordering::AcqRel);
        self.reentrant_guard.store(false, Ordering::Release);
        Ok(())
    }
}
