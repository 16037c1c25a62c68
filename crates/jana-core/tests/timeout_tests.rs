//! Worker timeout scenario (spec.md §8, scenario 5): a processor that hangs
//! well past the configured timeout should force the engine to exit with
//! `ExitCode::Timeout` rather than hang forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jana_components::demo::{CountingSink, CountingSource};
use jana_core::{Arrow, BackoffStrategy, EngineConfig, Event, EngineResult, EventPool, ExecutionEngine, ExitCode, Level, Processor, Queue, Topology};

struct TestBackoff;
impl BackoffStrategy for TestBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        Duration::from_millis(1)
    }
}

/// Simulates a stuck component: blocks far longer than the engine's
/// configured timeout.
struct HangingProcessor;
impl Processor for HangingProcessor {
    fn process_parallel(&self, _event: &Event) -> EngineResult<()> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(())
    }
}

#[test]
fn stuck_worker_forces_timeout_exit() {
    let mut config = EngineConfig::default();
    config.nthreads = 1;
    config.timeout = Duration::from_millis(150);
    config.warmup_timeout = Duration::from_millis(150);

    let pool = Arc::new(EventPool::new(4, 1, true, Level::PhysicsEvent));
    let q1 = Arc::new(Queue::new(8, 4, 1));
    let q2 = Arc::new(Queue::new(8, 4, 1));

    let source = Arrow::source("source", vec![Box::new(CountingSource::new(1, 5))], pool.clone(), q1.clone(), 1);
    let map = Arrow::map("stuck", vec![Box::new(HangingProcessor)], q1, q2.clone(), true);
    let sink = Arrow::sink("sink", Box::new(CountingSink::new()), q2, pool.clone());

    let mut topology = Topology::new();
    topology.add_pool(pool);
    let s = topology.add_arrow(Arc::new(source));
    let m = topology.add_arrow(Arc::new(map));
    let k = topology.add_arrow(Arc::new(sink));
    topology.add_edge(s, m);
    topology.add_edge(m, k);

    let engine = ExecutionEngine::new(topology, config, Arc::new(TestBackoff));

    let start = Instant::now();
    let exit = engine.run();
    let elapsed = start.elapsed();

    assert_eq!(exit, ExitCode::Timeout);
    assert!(elapsed >= Duration::from_millis(150), "should not fire before the timeout elapses");
    assert!(elapsed < Duration::from_secs(3), "should not wait for the full 5s hang");
}
