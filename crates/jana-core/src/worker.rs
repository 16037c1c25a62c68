//! A thread that loops over scheduler assignments and fires arrows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, info, trace};

use crate::backoff::BackoffStrategy;
use crate::errors::EngineError;
use crate::metrics::WorkerMetrics;
use crate::scheduler::{PriorOutcome, Scheduler};

/// The engine's pause/resume suspension point (§5, suspension (iv)). Shared
/// by every worker; `Engine::pause`/`Engine::resume` flip `paused` and
/// notify the condvar.
#[derive(Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    cv: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock().expect("pause gate poisoned") = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().expect("pause gate poisoned") = false;
        self.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().expect("pause gate poisoned")
    }

    /// Blocks the calling worker thread while the engine is paused.
    fn wait_while_paused(&self) {
        let mut guard = self.paused.lock().expect("pause gate poisoned");
        while *guard {
            guard = self.cv.wait(guard).expect("pause gate poisoned");
        }
    }
}

/// One worker thread, bound to a single locality. Loops: request
/// assignment, back off on `None`, otherwise fire the arrow exactly once.
pub struct Worker {
    id: usize,
    location: usize,
    backoff: Arc<dyn BackoffStrategy>,
    backoff_tries: u32,
    last_heartbeat: Mutex<Instant>,
    fired_once: AtomicBool,
    metrics: Mutex<WorkerMetrics>,
    shutdown: Arc<AtomicBool>,
    pause_gate: Arc<PauseGate>,
    checkin_time: Duration,
    last_checkin: Mutex<Instant>,
    live_metrics: Arc<DashMap<usize, WorkerMetrics>>,
    global_stop: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<EngineError>>>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        location: usize,
        backoff: Arc<dyn BackoffStrategy>,
        backoff_tries: u32,
        pause_gate: Arc<PauseGate>,
        checkin_time: Duration,
        live_metrics: Arc<DashMap<usize, WorkerMetrics>>,
        global_stop: Arc<AtomicBool>,
        fatal: Arc<Mutex<Option<EngineError>>>,
    ) -> Self {
        Self {
            id,
            location,
            backoff,
            backoff_tries,
            last_heartbeat: Mutex::new(Instant::now()),
            fired_once: AtomicBool::new(false),
            metrics: Mutex::new(WorkerMetrics::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            pause_gate,
            checkin_time,
            last_checkin: Mutex::new(Instant::now()),
            live_metrics,
            global_stop,
            fatal,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn location(&self) -> usize {
        self.location
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().expect("heartbeat mutex poisoned").elapsed()
    }

    /// True once this worker has fired at least one arrow — gates whether
    /// the engine applies `timeout` or the more lenient `warmup_timeout`.
    pub fn has_fired_once(&self) -> bool {
        self.fired_once.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> WorkerMetrics {
        *self.metrics.lock().expect("worker metrics poisoned")
    }

    fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().expect("heartbeat mutex poisoned") = Instant::now();
    }

    /// Pushes this worker's local metrics snapshot into the engine's live
    /// map every `checkin_time`, per §4.9 step 4. Each worker only ever
    /// writes its own key, so this never contends with another worker's
    /// check-in — the one place a concurrent map earns its keep over a
    /// single mutex-guarded table.
    fn maybe_checkin(&self) {
        let mut last = self.last_checkin.lock().expect("checkin mutex poisoned");
        if last.elapsed() < self.checkin_time {
            return;
        }
        *last = Instant::now();
        self.live_metrics.insert(self.id, self.metrics());
    }

    /// Component failures (source/processor/factory) surfaced as
    /// `FireResult::Error` are fatal for the job (§7): the first one wins,
    /// and every worker is asked to stop.
    fn report_fatal(&self, e: EngineError) {
        let mut guard = self.fatal.lock().expect("fatal error mutex poisoned");
        if guard.is_none() {
            error!(worker = self.id, error = %e, "fatal component failure, stopping job");
            *guard = Some(e);
        }
        self.global_stop.store(true, Ordering::Release);
    }

    /// Runs the worker loop until `request_shutdown` is observed. Intended
    /// to be called from inside a dedicated `std::thread`.
    pub fn run(self: &Arc<Self>, scheduler: &Scheduler) {
        info!(worker = self.id, location = self.location, "worker starting");
        let mut prior: Option<(usize, PriorOutcome)> = None;
        let mut attempt: u32 = 0;

        loop {
            self.touch_heartbeat();
            self.maybe_checkin();

            if self.shutdown.load(Ordering::Acquire) || self.global_stop.load(Ordering::Acquire) {
                if let Some((idx, outcome)) = prior.take() {
                    scheduler.last_assignment(idx, outcome);
                }
                self.live_metrics.insert(self.id, self.metrics());
                break;
            }

            if self.pause_gate.is_paused() {
                let pause_start = Instant::now();
                self.pause_gate.wait_while_paused();
                self.metrics.lock().expect("worker metrics poisoned").idle_time += pause_start.elapsed();
                self.touch_heartbeat();
                continue;
            }

            match scheduler.next_assignment(prior.take()) {
                None => {
                    attempt = (attempt + 1).min(self.backoff_tries);
                    let sleep_start = Instant::now();
                    std::thread::sleep(self.backoff.next_delay(attempt));
                    self.metrics.lock().expect("worker metrics poisoned").scheduler_time += sleep_start.elapsed();
                }
                Some(idx) => {
                    attempt = 0;
                    let arrow = &scheduler.arrows()[idx];
                    trace!(worker = self.id, arrow = arrow.name(), "firing");
                    let start = Instant::now();
                    let result = arrow.execute(self.location);
                    self.metrics.lock().expect("worker metrics poisoned").useful_time += start.elapsed();
                    self.fired_once.store(true, Ordering::Release);
                    self.touch_heartbeat();
                    if let crate::arrow::FireResult::Error(ref e) = result {
                        self.report_fatal(e.clone());
                    }
                    prior = Some((idx, PriorOutcome::from(&result)));
                }
            }
        }
        debug!(worker = self.id, "worker stopped");
    }
}
