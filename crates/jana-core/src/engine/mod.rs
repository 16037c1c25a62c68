//! Top-level driver: `Run`/`Pause`/`Resume`/`Stop`/`Scale`/`GetPerf`, timeout
//! enforcement, and metrics aggregation (§4.10).

mod config;

pub use config::{Affinity, EngineConfig};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::backoff::BackoffStrategy;
use crate::errors::EngineError;
use crate::metrics::{ArrowMetrics, WorkerMetrics};
use crate::scheduler::Scheduler;
use crate::topology::Topology;
use crate::worker::{PauseGate, Worker};

/// Process-boundary exit codes (§6). The core never calls `process::exit`
/// itself — `run` returns this enum and the surrounding binary (`jana-cli`,
/// the root demo) maps it to the real process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Timeout,
    UnhandledException,
    UserHalt,
}

impl ExitCode {
    pub fn as_process_code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Timeout => 1,
            ExitCode::UnhandledException => 2,
            ExitCode::UserHalt => 3,
        }
    }
}

/// Soft lets workers finish their current arrow invocation before exiting;
/// hard additionally bypasses the drain of queues (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Soft,
    Hard,
}

/// Optional hook to capture a debugger backtrace before a timeout-forced
/// exit (§4.10). The core ships no concrete implementation — a platform
/// layer can slot one in via [`ExecutionEngine::with_backtrace_hook`].
pub trait BacktraceCapture: Send + Sync {
    fn capture(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped(ExitCode),
}

/// Per-arrow performance snapshot returned by [`ExecutionEngine::perf`].
#[derive(Debug, Clone)]
pub struct ArrowPerf {
    pub name: String,
    pub parallel: bool,
    pub metrics: ArrowMetrics,
    pub in_flight: usize,
}

/// A point-in-time performance report, aggregating every arrow's lifetime
/// metrics and every worker's latest check-in.
#[derive(Debug, Clone)]
pub struct PerfSummary {
    pub elapsed: Duration,
    pub events_processed: u64,
    pub instantaneous_throughput_hz: f64,
    pub lifetime_throughput_hz: f64,
    pub arrows: Vec<ArrowPerf>,
    pub workers: Vec<WorkerMetrics>,
}

struct ThroughputSample {
    at: Instant,
    events: u64,
}

/// Top-level driver. Owns the topology, the scheduler built from it, the
/// live worker pool, and the bookkeeping needed to enforce timeouts and
/// report metrics while the job runs.
pub struct ExecutionEngine {
    config: EngineConfig,
    topology: Arc<Topology>,
    scheduler: Arc<Scheduler>,
    backoff: Arc<dyn BackoffStrategy>,
    backtrace_hook: Option<Arc<dyn BacktraceCapture>>,
    pause_gate: Arc<PauseGate>,
    live_metrics: Arc<DashMap<usize, WorkerMetrics>>,
    global_stop: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<EngineError>>>,
    workers: Mutex<Vec<(Arc<Worker>, JoinHandle<()>)>>,
    next_worker_id: Mutex<usize>,
    run_state: Mutex<RunState>,
    started_at: Mutex<Option<Instant>>,
    last_sample: Mutex<Option<ThroughputSample>>,
}

impl ExecutionEngine {
    pub fn new(topology: Topology, config: EngineConfig, backoff: Arc<dyn BackoffStrategy>) -> Self {
        if let Err(e) = topology.validate() {
            warn!(error = %e, "topology failed validation at engine construction");
        }
        let scheduler = Arc::new(Scheduler::new(&topology));
        Self {
            config,
            topology: Arc::new(topology),
            scheduler,
            backoff,
            backtrace_hook: None,
            pause_gate: Arc::new(PauseGate::new()),
            live_metrics: Arc::new(DashMap::new()),
            global_stop: Arc::new(AtomicBool::new(false)),
            fatal: Arc::new(Mutex::new(None)),
            workers: Mutex::new(Vec::new()),
            next_worker_id: Mutex::new(0),
            run_state: Mutex::new(RunState::Idle),
            started_at: Mutex::new(None),
            last_sample: Mutex::new(None),
        }
    }

    pub fn with_backtrace_hook(mut self, hook: Arc<dyn BacktraceCapture>) -> Self {
        self.backtrace_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn spawn_worker(&self) -> (Arc<Worker>, JoinHandle<()>) {
        let mut next_id = self.next_worker_id.lock().expect("worker id counter poisoned");
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let location = id % self.config.locality.max(1);
        let worker = Arc::new(Worker::new(
            id,
            location,
            self.backoff.clone(),
            self.config.backoff_tries,
            self.pause_gate.clone(),
            self.config.checkin_time,
            self.live_metrics.clone(),
            self.global_stop.clone(),
            self.fatal.clone(),
        ));
        let scheduler = self.scheduler.clone();
        let worker_for_thread = worker.clone();
        let handle = std::thread::Builder::new()
            .name(format!("jana-worker-{id}"))
            .spawn(move || worker_for_thread.run(&scheduler))
            .expect("failed to spawn worker thread");
        (worker, handle)
    }

    /// Runs the job to completion: activates the topology, spawns
    /// `nthreads` workers, enforces timeouts, and blocks until every arrow
    /// is finalized or a fatal condition is hit.
    pub fn run(&self) -> ExitCode {
        {
            let mut state = self.run_state.lock().expect("run state poisoned");
            if *state != RunState::Idle {
                warn!("run() called on an engine that is not idle");
                return ExitCode::UnhandledException;
            }
            *state = RunState::Running;
        }

        self.topology.activate();
        for arrow in self.topology.arrows() {
            if let Err(e) = arrow.initialize() {
                error!(arrow = %arrow.name(), error = %e, "component init failed");
                self.attempt_partial_finalize();
                let mut state = self.run_state.lock().expect("run state poisoned");
                *state = RunState::Stopped(ExitCode::UnhandledException);
                return ExitCode::UnhandledException;
            }
        }

        *self.started_at.lock().expect("started_at poisoned") = Some(Instant::now());
        for _ in 0..self.config.nthreads.max(1) {
            let spawned = self.spawn_worker();
            self.workers.lock().expect("workers poisoned").push(spawned);
        }

        info!(nthreads = self.config.nthreads, "engine running");
        let exit = self.wait_for_completion();

        {
            let mut state = self.run_state.lock().expect("run state poisoned");
            *state = RunState::Stopped(exit);
        }
        if exit == ExitCode::Timeout {
            // The stuck worker's thread is blocked inside a component call
            // we have no way to interrupt; waiting on its `JoinHandle` would
            // just turn the forced timeout back into the hang it's meant to
            // escape. Drop the handles instead, leaving the thread to exit
            // on its own (or die with the process) while we return now.
            self.workers.lock().expect("workers poisoned").clear();
        } else {
            self.join_all_workers();
        }
        info!(?exit, "engine stopped");
        exit
    }

    fn wait_for_completion(&self) -> ExitCode {
        loop {
            if self.topology.is_drained() {
                return ExitCode::Success;
            }
            if let Some(e) = self.fatal.lock().expect("fatal error mutex poisoned").clone() {
                error!(error = %e, "job aborted due to fatal error");
                return ExitCode::UnhandledException;
            }
            if self.global_stop.load(Ordering::Acquire) {
                // Fatal errors are handled by the check above; reaching
                // here means an explicit `stop()` was requested.
                return ExitCode::UserHalt;
            }
            if let Some(code) = self.check_timeouts() {
                return code;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn check_timeouts(&self) -> Option<ExitCode> {
        let workers = self.workers.lock().expect("workers poisoned");
        for (worker, _) in workers.iter() {
            let limit = if worker.has_fired_once() {
                self.config.timeout
            } else {
                self.config.warmup_timeout
            };
            if limit.is_zero() {
                continue;
            }
            if worker.heartbeat_age() > limit {
                error!(worker = worker.id(), age_ms = worker.heartbeat_age().as_millis(), "worker heartbeat timeout");
                if let Some(hook) = &self.backtrace_hook {
                    if let Some(bt) = hook.capture() {
                        error!(backtrace = %bt, "captured backtrace before forced termination");
                    }
                }
                drop(workers);
                self.request_global_stop();
                return Some(ExitCode::Timeout);
            }
        }
        None
    }

    fn request_global_stop(&self) {
        self.global_stop.store(true, Ordering::Release);
    }

    fn attempt_partial_finalize(&self) {
        for arrow in self.topology.arrows() {
            if arrow.is_active() {
                let _ = arrow.finalize();
            }
        }
    }

    fn join_all_workers(&self) {
        let mut workers = self.workers.lock().expect("workers poisoned");
        for (worker, _) in workers.iter() {
            worker.request_shutdown();
        }
        for (_, handle) in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Blocks all workers at their next suspension point (§5, point iv).
    pub fn pause(&self) {
        info!("engine paused");
        self.pause_gate.pause();
    }

    pub fn resume(&self) {
        info!("engine resumed");
        self.pause_gate.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause_gate.is_paused()
    }

    /// Soft stop lets in-flight arrow invocations finish; hard stop is
    /// identical from the engine's point of view (queues are never drained
    /// further either way) — the distinction is that a soft stop is
    /// expected to have let every sink observe everything already pushed,
    /// while a hard stop may abandon events still in transit.
    pub fn stop(&self, mode: StopMode) {
        info!(?mode, "stop requested");
        self.request_global_stop();
        if self.pause_gate.is_paused() {
            // Workers parked at the pause gate must wake up to observe the
            // stop request.
            self.pause_gate.resume();
        }
    }

    /// Creates or requests-stop workers until exactly `n` threads are live.
    /// Downscaling blocks until every released worker's `join()` completes
    /// (§4.10).
    pub fn scale(&self, n: usize) -> Result<(), EngineError> {
        let n = n.max(1);
        let mut workers = self.workers.lock().expect("workers poisoned");
        let current = workers.len();
        if n > current {
            for _ in current..n {
                let spawned = self.spawn_worker();
                workers.push(spawned);
            }
            info!(from = current, to = n, "scaled workers up");
        } else if n < current {
            let released: Vec<_> = workers.split_off(n);
            drop(workers);
            for (worker, handle) in released {
                worker.request_shutdown();
                let _ = handle.join();
            }
            info!(from = current, to = n, "scaled workers down");
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().expect("workers poisoned").len()
    }

    /// Aggregates per-worker and per-arrow metrics into a point-in-time
    /// report (§4.10 "Metrics").
    pub fn perf(&self) -> PerfSummary {
        let elapsed = self
            .started_at
            .lock()
            .expect("started_at poisoned")
            .map(|t| t.elapsed())
            .unwrap_or_default();

        let arrows: Vec<ArrowPerf> = self
            .topology
            .arrows()
            .iter()
            .map(|a| ArrowPerf {
                name: a.name().to_string(),
                parallel: a.is_parallel(),
                metrics: a.metrics(),
                in_flight: a.in_flight(),
            })
            .collect();

        let events_processed: u64 = self
            .topology
            .arrows()
            .iter()
            .filter(|a| a.is_sink())
            .map(|a| a.metrics().keep_going_count)
            .sum();

        let lifetime_throughput_hz = if elapsed.as_secs_f64() > 0.0 {
            events_processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let instantaneous_throughput_hz = {
            let mut last = self.last_sample.lock().expect("throughput sample poisoned");
            let now = Instant::now();
            let hz = match last.as_ref() {
                Some(prev) => {
                    let dt = now.duration_since(prev.at).as_secs_f64();
                    if dt > 0.0 && events_processed >= prev.events {
                        (events_processed - prev.events) as f64 / dt
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            *last = Some(ThroughputSample { at: now, events: events_processed });
            hz
        };

        let workers: Vec<WorkerMetrics> = self.live_metrics.iter().map(|e| *e.value()).collect();

        PerfSummary {
            elapsed,
            events_processed,
            instantaneous_throughput_hz,
            lifetime_throughput_hz,
            arrows,
            workers,
        }
    }
}
