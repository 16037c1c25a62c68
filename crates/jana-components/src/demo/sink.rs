use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use jana_core::{EngineError, EngineResult, Event, Processor};

/// Counts the events it sees and, optionally, checks that event numbers
/// arrive in strictly increasing order — used to validate ordering mode
/// (spec.md §8, "Monotonicity").
#[derive(Default)]
pub struct CountingSink {
    count: AtomicU64,
    check_ordering: bool,
    last_seen: Mutex<Option<u64>>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ordering_check() -> Self {
        Self {
            check_ordering: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

impl Processor for CountingSink {
    fn process_sequential(&self, event: &Event) -> EngineResult<()> {
        if self.check_ordering {
            let mut last = self.last_seen.lock().expect("last_seen poisoned");
            let number = event.event_number();
            if let Some(prev) = *last {
                if number <= prev {
                    return Err(EngineError::Internal(format!(
                        "ordering violated: event {number} observed after {prev}"
                    )));
                }
            }
            *last = Some(number);
        }
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
