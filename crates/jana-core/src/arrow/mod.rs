//! Arrows: vertices in the execution DAG.

mod components;

pub use components::{Folder, FoldStatus, Processor, Source, SourceStatus, Unfolder, UnfoldStatus};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::event::EventHandle;
use crate::identity::Level;
use crate::metrics::{ArrowMetrics, Outcome};
use crate::pool::EventPool;
use crate::queue::Queue;

/// Outcome of a single `Execute` call, per §4.6.
#[derive(Debug)]
pub enum FireResult {
    KeepGoing,
    ComeBackLater,
    Finished,
    Error(EngineError),
}

/// The tagged payload distinguishing the five arrow kinds. Kept as one
/// `enum` rather than five trait-object hierarchies so the scheduler's hot
/// path (matching on `&self.kind`) stays monomorphic (§9).
enum ArrowKind {
    Source {
        sources: Mutex<VecDeque<Box<dyn Source>>>,
        pool: Arc<EventPool>,
        output: Arc<Queue>,
    },
    Map {
        processors: Vec<Box<dyn Processor>>,
        input: Arc<Queue>,
        output: Arc<Queue>,
        sequential_lock: Mutex<()>,
    },
    Unfold {
        unfolder: Mutex<Box<dyn Unfolder>>,
        parent_level: Level,
        input: Arc<Queue>,
        parent_pool: Arc<EventPool>,
        child_pool: Arc<EventPool>,
        output: Arc<Queue>,
        current_parent: Mutex<Option<EventHandle>>,
    },
    Fold {
        folder: Mutex<Box<dyn Folder>>,
        parent_level: Level,
        input: Arc<Queue>,
        child_pool: Arc<EventPool>,
        output: Arc<Queue>,
    },
    Sink {
        processor: Box<dyn Processor>,
        input: Arc<Queue>,
        pool: Arc<EventPool>,
    },
}

/// A vertex in the topology. Holds its own scheduling bookkeeping
/// (in-flight worker count, activation state) so the scheduler need only
/// touch one word per transition (§4.8).
pub struct Arrow {
    name: String,
    parallel: bool,
    chunk_size: usize,
    kind: ArrowKind,
    in_flight: AtomicUsize,
    active: AtomicBool,
    upstream_finished: AtomicBool,
    reported_finished: AtomicBool,
    finished: AtomicBool,
    initialized: AtomicBool,
    finalized: AtomicBool,
    metrics: Mutex<ArrowMetrics>,
}

impl Arrow {
    pub fn source(name: impl Into<String>, sources: Vec<Box<dyn Source>>, pool: Arc<EventPool>, output: Arc<Queue>, chunk_size: usize) -> Self {
        Self::new(
            name,
            true,
            chunk_size,
            ArrowKind::Source {
                sources: Mutex::new(sources.into_iter().collect()),
                pool,
                output,
            },
        )
    }

    pub fn map(
        name: impl Into<String>,
        processors: Vec<Box<dyn Processor>>,
        input: Arc<Queue>,
        output: Arc<Queue>,
        parallel: bool,
    ) -> Self {
        Self::new(
            name,
            parallel,
            1,
            ArrowKind::Map {
                processors,
                input,
                output,
                sequential_lock: Mutex::new(()),
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn unfold(
        name: impl Into<String>,
        unfolder: Box<dyn Unfolder>,
        parent_level: Level,
        input: Arc<Queue>,
        parent_pool: Arc<EventPool>,
        child_pool: Arc<EventPool>,
        output: Arc<Queue>,
    ) -> Self {
        Self::new(
            name,
            true,
            1,
            ArrowKind::Unfold {
                unfolder: Mutex::new(unfolder),
                parent_level,
                input,
                parent_pool,
                child_pool,
                output,
                current_parent: Mutex::new(None),
            },
        )
    }

    pub fn fold(
        name: impl Into<String>,
        folder: Box<dyn Folder>,
        parent_level: Level,
        input: Arc<Queue>,
        child_pool: Arc<EventPool>,
        output: Arc<Queue>,
    ) -> Self {
        Self::new(
            name,
            true,
            1,
            ArrowKind::Fold {
                folder: Mutex::new(folder),
                parent_level,
                input,
                child_pool,
                output,
            },
        )
    }

    pub fn sink(name: impl Into<String>, processor: Box<dyn Processor>, input: Arc<Queue>, pool: Arc<EventPool>) -> Self {
        Self::new(name, true, 1, ArrowKind::Sink { processor, input, pool })
    }

    fn new(name: impl Into<String>, parallel: bool, chunk_size: usize, kind: ArrowKind) -> Self {
        Self {
            name: name.into(),
            parallel,
            chunk_size: chunk_size.max(1),
            kind,
            in_flight: AtomicUsize::new(0),
            active: AtomicBool::new(false),
            upstream_finished: AtomicBool::new(false),
            reported_finished: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            metrics: Mutex::new(ArrowMetrics::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, ArrowKind::Source { .. })
    }

    pub fn is_sink(&self) -> bool {
        matches!(self.kind, ArrowKind::Sink { .. })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn inc_in_flight(&self) -> usize {
        self.in_flight.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn dec_in_flight(&self) -> usize {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1);
        prev - 1
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub fn is_upstream_finished(&self) -> bool {
        self.upstream_finished.load(Ordering::Acquire)
    }

    pub fn mark_upstream_finished(&self) {
        self.upstream_finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Set once this arrow's own `Execute` has reported [`FireResult::Finished`].
    /// Distinct from [`Arrow::is_finished`], which only becomes true after
    /// `Finalize` has actually run (in-flight count reached zero).
    pub fn is_reported_finished(&self) -> bool {
        self.reported_finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_reported_finished(&self) {
        self.reported_finished.store(true, Ordering::Release);
    }

    pub fn metrics(&self) -> ArrowMetrics {
        *self.metrics.lock().expect("arrow metrics poisoned")
    }

    /// Called at most once, before the arrow is first scheduled.
    pub fn initialize(&self) -> Result<(), EngineError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let ArrowKind::Source { sources, .. } = &self.kind {
            let mut srcs = sources.lock().expect("source list poisoned");
            if let Some(front) = srcs.front_mut() {
                front.open()?;
            }
        }
        debug!(arrow = %self.name, "initialized");
        Ok(())
    }

    /// Called at most once, after the arrow reported `Finished` and its
    /// in-flight count reached zero.
    pub fn finalize(&self) -> Result<(), EngineError> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.finished.store(true, Ordering::Release);
        debug!(arrow = %self.name, "finalized");
        Ok(())
    }

    /// Runs the reserve/pop/compute/push/metrics protocol for this arrow's
    /// kind, at `location`.
    pub fn execute(&self, location: usize) -> FireResult {
        let start = Instant::now();
        let result = match &self.kind {
            ArrowKind::Source { sources, pool, output } => {
                self.execute_source(sources, pool, output, location)
            }
            ArrowKind::Map {
                processors,
                input,
                output,
                sequential_lock,
            } => self.execute_map(processors, input, output, sequential_lock, location),
            ArrowKind::Unfold {
                unfolder,
                parent_level,
                input,
                parent_pool,
                child_pool,
                output,
                current_parent,
            } => self.execute_unfold(unfolder, *parent_level, input, parent_pool, child_pool, output, current_parent, location),
            ArrowKind::Fold {
                folder,
                parent_level,
                input,
                child_pool,
                output,
            } => self.execute_fold(folder, *parent_level, input, child_pool, output, location),
            ArrowKind::Sink { processor, input, pool } => self.execute_sink(processor.as_ref(), input, pool, location),
        };

        if matches!(result, FireResult::Finished) {
            self.mark_reported_finished();
        }
        let outcome = match &result {
            FireResult::KeepGoing | FireResult::Finished => Outcome::KeepGoing,
            FireResult::ComeBackLater => Outcome::ComeBackLater,
            FireResult::Error(_) => Outcome::Error,
        };
        self.metrics.lock().expect("arrow metrics poisoned").record(start.elapsed(), outcome);
        if let FireResult::Error(e) = &result {
            warn!(arrow = %self.name, error = %e, "arrow execution failed");
        }
        result
    }

    fn execute_source(&self, sources: &Mutex<VecDeque<Box<dyn Source>>>, pool: &Arc<EventPool>, output: &Arc<Queue>, location: usize) -> FireResult {
        if output.reserve(self.chunk_size, location).is_err() {
            return FireResult::ComeBackLater;
        }

        let mut produced: Vec<EventHandle> = Vec::new();
        let mut exhausted = false;
        {
            let mut srcs = sources.lock().expect("source list poisoned");
            'chunk: while produced.len() < self.chunk_size {
                let Some(front) = srcs.front_mut() else {
                    exhausted = true;
                    break 'chunk;
                };
                let Some(event) = pool.get(location) else {
                    break 'chunk;
                };
                match front.emit(event.as_ref()) {
                    Ok(SourceStatus::Success) => produced.push(event),
                    Ok(SourceStatus::TryAgain) => {
                        pool.release(event, location);
                        break 'chunk;
                    }
                    Ok(SourceStatus::Finished) => {
                        pool.release(event, location);
                        if let Err(e) = front.close() {
                            output.unreserve(self.chunk_size, location);
                            return FireResult::Error(e);
                        }
                        srcs.pop_front();
                        match srcs.front_mut() {
                            Some(next) => {
                                if let Err(e) = next.open() {
                                    output.unreserve(self.chunk_size, location);
                                    return FireResult::Error(e);
                                }
                            }
                            None => {
                                exhausted = true;
                                break 'chunk;
                            }
                        }
                    }
                    Err(e) => {
                        pool.release(event, location);
                        output.unreserve(self.chunk_size, location);
                        return FireResult::Error(e);
                    }
                }
            }
        }

        let unused = self.chunk_size - produced.len();
        if unused > 0 {
            output.unreserve(unused, location);
        }
        if produced.is_empty() {
            return if exhausted { FireResult::Finished } else { FireResult::ComeBackLater };
        }
        output.commit(produced, location);
        if exhausted {
            FireResult::Finished
        } else {
            FireResult::KeepGoing
        }
    }

    fn execute_map(
        &self,
        processors: &[Box<dyn Processor>],
        input: &Arc<Queue>,
        output: &Arc<Queue>,
        sequential_lock: &Mutex<()>,
        location: usize,
    ) -> FireResult {
        if output.reserve(1, location).is_err() {
            return FireResult::ComeBackLater;
        }
        let mut popped = input.pop(1, 1, location);
        if popped.is_empty() {
            output.unreserve(1, location);
            return if self.is_upstream_finished() {
                FireResult::Finished
            } else {
                FireResult::ComeBackLater
            };
        }
        let event = popped.remove(0);

        for p in processors {
            if let Err(e) = p.process_parallel(event.as_ref()) {
                output.unreserve(1, location);
                return FireResult::Error(e);
            }
        }
        {
            let _guard = sequential_lock.lock().expect("sequential lock poisoned");
            for p in processors {
                if let Err(e) = p.process_sequential(event.as_ref()) {
                    output.unreserve(1, location);
                    return FireResult::Error(e);
                }
            }
        }
        output.commit(vec![event], location);
        FireResult::KeepGoing
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_unfold(
        &self,
        unfolder: &Mutex<Box<dyn Unfolder>>,
        parent_level: Level,
        input: &Arc<Queue>,
        parent_pool: &Arc<EventPool>,
        child_pool: &Arc<EventPool>,
        output: &Arc<Queue>,
        current_parent: &Mutex<Option<EventHandle>>,
        location: usize,
    ) -> FireResult {
        if output.reserve(1, location).is_err() {
            return FireResult::ComeBackLater;
        }
        let mut state = current_parent.lock().expect("unfold state poisoned");
        if state.is_none() {
            let popped = input.pop(1, 1, location);
            if popped.is_empty() {
                output.unreserve(1, location);
                return if self.is_upstream_finished() {
                    FireResult::Finished
                } else {
                    FireResult::ComeBackLater
                };
            }
            *state = Some(popped.into_iter().next().expect("checked non-empty"));
        }
        let parent = state.as_ref().expect("just set").clone();

        let Some(child) = child_pool.get(location) else {
            output.unreserve(1, location);
            return FireResult::ComeBackLater;
        };

        let status = {
            let mut u = unfolder.lock().expect("unfolder poisoned");
            u.unfold(parent.as_ref(), child.as_ref())
        };

        match status {
            Ok(UnfoldStatus::NextChildReady) => {
                if let Err(e) = child.add_parent(parent_level, parent.clone()) {
                    child_pool.release(child, location);
                    output.unreserve(1, location);
                    return FireResult::Error(e);
                }
                output.commit(vec![child], location);
                FireResult::KeepGoing
            }
            Ok(UnfoldStatus::FinishedWithParent) => {
                child_pool.release(child, location);
                parent_pool.release(parent, location);
                *state = None;
                output.unreserve(1, location);
                FireResult::KeepGoing
            }
            Err(e) => {
                child_pool.release(child, location);
                output.unreserve(1, location);
                FireResult::Error(e)
            }
        }
    }

    fn execute_fold(
        &self,
        folder: &Mutex<Box<dyn Folder>>,
        parent_level: Level,
        input: &Arc<Queue>,
        child_pool: &Arc<EventPool>,
        output: &Arc<Queue>,
        location: usize,
    ) -> FireResult {
        if output.reserve(1, location).is_err() {
            return FireResult::ComeBackLater;
        }
        let mut popped = input.pop(1, 1, location);
        if popped.is_empty() {
            output.unreserve(1, location);
            return if self.is_upstream_finished() {
                FireResult::Finished
            } else {
                FireResult::ComeBackLater
            };
        }
        let child = popped.remove(0);
        let Some((parent, _now_zero)) = child.release_parent(parent_level) else {
            output.unreserve(1, location);
            return FireResult::Error(EngineError::Internal("fold input event has no matching parent link".to_string()));
        };

        let status = {
            let mut f = folder.lock().expect("folder poisoned");
            f.fold(parent.as_ref(), child.as_ref())
        };
        let status = match status {
            Ok(s) => s,
            Err(e) => {
                child_pool.release(child, location);
                output.unreserve(1, location);
                return FireResult::Error(e);
            }
        };
        child_pool.release(child, location);
        match status {
            FoldStatus::KeepAccumulating => {
                output.unreserve(1, location);
                FireResult::KeepGoing
            }
            FoldStatus::Complete => {
                // The last `release_parent` just paid the refcount down to
                // whatever the unfold side's own release left unaccounted
                // for (typically 0): reinstate the single pipeline-owned
                // hold, matching how a freshly-checked-out Event starts at
                // 1, so the downstream sink's one `release` recycles it
                // instead of underflowing.
                parent.set_refcount(1);
                output.commit(vec![parent], location);
                FireResult::KeepGoing
            }
        }
    }

    fn execute_sink(&self, processor: &dyn Processor, input: &Arc<Queue>, pool: &Arc<EventPool>, location: usize) -> FireResult {
        let popped = input.pop(1, 1, location);
        if popped.is_empty() {
            return if self.is_upstream_finished() {
                FireResult::Finished
            } else {
                FireResult::ComeBackLater
            };
        }
        let event = popped.into_iter().next().expect("checked non-empty");
        if let Err(e) = processor.process_parallel(event.as_ref()) {
            return FireResult::Error(e);
        }
        if let Err(e) = processor.process_sequential(event.as_ref()) {
            return FireResult::Error(e);
        }
        pool.release(event, location);
        FireResult::KeepGoing
    }
}
