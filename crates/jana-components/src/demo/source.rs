use std::sync::atomic::{AtomicU64, Ordering};

use jana_core::{Event, EngineResult, Source, SourceStatus};

/// Emits `count` events with event numbers `1..=count`, all on the same
/// run. Analogous to `chem-adapters::AcquireMoleculesStep`: a deterministic
/// Source used to validate the pipeline end to end.
pub struct CountingSource {
    run_number: i64,
    count: u64,
    emitted: AtomicU64,
}

impl CountingSource {
    pub fn new(run_number: i64, count: u64) -> Self {
        Self {
            run_number,
            count,
            emitted: AtomicU64::new(0),
        }
    }

    pub fn emitted_count(&self) -> u64 {
        self.emitted.load(Ordering::Acquire)
    }
}

impl Source for CountingSource {
    fn emit(&mut self, event: &Event) -> EngineResult<SourceStatus> {
        let next = self.emitted.load(Ordering::Acquire) + 1;
        if next > self.count {
            return Ok(SourceStatus::Finished);
        }
        event.set_run_number(self.run_number);
        event.set_event_number(next);
        self.emitted.store(next, Ordering::Release);
        Ok(SourceStatus::Success)
    }
}
