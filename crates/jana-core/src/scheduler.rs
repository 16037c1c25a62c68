//! Assigns ready arrows to worker threads; tracks activation/finalisation.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::arrow::{Arrow, FireResult};
use crate::topology::{Edge, Topology};

/// What the worker observed on its prior assignment, condensed to what the
/// scheduler needs to decide the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorOutcome {
    KeepGoing,
    ComeBackLater,
    Finished,
    Error,
}

impl From<&FireResult> for PriorOutcome {
    fn from(result: &FireResult) -> Self {
        match result {
            FireResult::KeepGoing => PriorOutcome::KeepGoing,
            FireResult::ComeBackLater => PriorOutcome::ComeBackLater,
            FireResult::Finished => PriorOutcome::Finished,
            FireResult::Error(_) => PriorOutcome::Error,
        }
    }
}

/// Owns the arrow list and their activation state. Workers call
/// [`Scheduler::next_assignment`]; everything but the short-circuit fast
/// path is serialised under one mutex (§4.8).
pub struct Scheduler {
    arrows: Vec<Arc<Arrow>>,
    edges: Vec<Edge>,
    cursor: Mutex<usize>,
}

impl Scheduler {
    pub fn new(topology: &Topology) -> Self {
        Self {
            arrows: topology.arrows().to_vec(),
            edges: topology.edges().to_vec(),
            cursor: Mutex::new(0),
        }
    }

    pub fn arrows(&self) -> &[Arc<Arrow>] {
        &self.arrows
    }

    fn eligible(&self, arrow: &Arrow) -> bool {
        if arrow.is_finished() || arrow.is_reported_finished() || !arrow.is_active() {
            return false;
        }
        if !arrow.is_parallel() && arrow.in_flight() > 0 {
            return false;
        }
        true
    }

    /// Returns the index of the arrow the worker should fire next, or
    /// `None` if nothing is currently eligible (the worker then backs off).
    ///
    /// `prior` is `None` only for a worker's very first request.
    pub fn next_assignment(&self, prior: Option<(usize, PriorOutcome)>) -> Option<usize> {
        if let Some((idx, PriorOutcome::KeepGoing)) = prior {
            if self.eligible(&self.arrows[idx]) {
                return Some(idx);
            }
        }

        let mut cursor = self.cursor.lock().expect("scheduler mutex poisoned");

        if let Some((idx, outcome)) = prior {
            self.return_prior(idx, outcome);
        }

        let n = self.arrows.len();
        if n == 0 {
            return None;
        }
        for step in 0..n {
            let i = (*cursor + step) % n;
            if self.eligible(&self.arrows[i]) {
                self.arrows[i].inc_in_flight();
                *cursor = (i + 1) % n;
                return Some(i);
            }
        }
        None
    }

    /// A worker's final check-in on shutdown: returns its assignment
    /// without requesting a new one.
    pub fn last_assignment(&self, idx: usize, outcome: PriorOutcome) {
        let _cursor = self.cursor.lock().expect("scheduler mutex poisoned");
        self.return_prior(idx, outcome);
    }

    fn return_prior(&self, idx: usize, outcome: PriorOutcome) {
        let arrow = &self.arrows[idx];
        if outcome == PriorOutcome::Finished {
            arrow.mark_reported_finished();
        }
        let remaining = arrow.dec_in_flight();
        if arrow.is_reported_finished() && remaining == 0 && !arrow.is_finished() {
            if let Err(e) = arrow.finalize() {
                debug!(arrow = %arrow.name(), error = %e, "finalize reported an error");
            }
            info!(arrow = %arrow.name(), "arrow finalized");
            for edge in self.edges.iter().filter(|e| e.producer == idx) {
                self.arrows[edge.consumer].mark_upstream_finished();
            }
        }
    }

    pub fn all_finalized(&self) -> bool {
        self.arrows.iter().all(|a| a.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrow::Processor;
    use crate::identity::Level;
    use crate::pool::EventPool;
    use crate::queue::Queue;

    struct NoopProcessor;
    impl Processor for NoopProcessor {}

    #[test]
    fn sequential_arrow_is_not_double_assigned() {
        let pool = Arc::new(EventPool::new(4, 1, true, Level::PhysicsEvent));
        let q = Arc::new(Queue::new(4, 4, 1));
        let map = Arc::new(Arrow::map("mapA", vec![Box::new(NoopProcessor)], q.clone(), q.clone(), false));

        let mut topo = Topology::new();
        topo.add_pool(pool);
        let idx = topo.add_arrow(map);
        topo.activate();
        let sched = Scheduler::new(&topo);
        sched.arrows()[idx].activate();

        let first = sched.next_assignment(None);
        assert_eq!(first, Some(idx));
        let second = sched.next_assignment(None);
        assert_eq!(second, None, "sequential arrow must not be assigned twice concurrently");
    }
}
