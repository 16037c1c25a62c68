//! Back-pressure scenario (spec.md §8, scenario 3): a slow sink behind a
//! low-threshold queue should push the source arrow into `ComeBackLater`
//! rather than ever letting the queue grow past capacity.

use std::sync::Arc;
use std::time::Duration;

use jana_components::demo::{CountingSink, CountingSource};
use jana_core::{Arrow, BackoffStrategy, EngineConfig, Event, EventPool, ExecutionEngine, ExitCode, Level, Processor, Queue, Topology};

struct TestBackoff;
impl BackoffStrategy for TestBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        Duration::from_millis(1)
    }
}

/// Forwards to a shared `CountingSink` after an artificial per-event delay,
/// standing in for the spec's "slow sink (10 ms/event)".
struct SlowSink {
    inner: Arc<CountingSink>,
    delay: Duration,
}
impl Processor for SlowSink {
    fn process_sequential(&self, event: &Event) -> jana_core::EngineResult<()> {
        std::thread::sleep(self.delay);
        self.inner.process_sequential(event)
    }
}

#[test]
fn backpressure_throttles_source_without_overflowing_queue() {
    const EVENTS: u64 = 30;
    const THRESHOLD: usize = 5;
    const CAPACITY: usize = 8;

    let mut config = EngineConfig::default();
    config.nthreads = 2;
    config.event_queue_threshold = THRESHOLD;

    let pool = Arc::new(EventPool::new(16, 1, true, Level::PhysicsEvent));
    let queue = Arc::new(Queue::new(CAPACITY, THRESHOLD, 1));

    let sink = Arc::new(CountingSink::new());
    let source = Arrow::source("source", vec![Box::new(CountingSource::new(1, EVENTS))], pool.clone(), queue.clone(), 1);
    let sink_arrow = Arrow::sink(
        "sink",
        Box::new(SlowSink {
            inner: sink.clone(),
            delay: Duration::from_millis(10),
        }),
        queue,
        pool.clone(),
    );

    let mut topology = Topology::new();
    topology.add_pool(pool.clone());
    let source_idx = topology.add_arrow(Arc::new(source));
    let sink_idx = topology.add_arrow(Arc::new(sink_arrow));
    topology.add_edge(source_idx, sink_idx);

    let engine = ExecutionEngine::new(topology, config, Arc::new(TestBackoff));
    let exit = engine.run();

    assert_eq!(exit, ExitCode::Success);
    assert_eq!(sink.count(), EVENTS);
    assert_eq!(pool.idle_count(), 16);

    let perf = engine.perf();
    let source_perf = perf.arrows.iter().find(|a| a.name == "source").expect("source arrow present");
    assert!(
        source_perf.metrics.come_back_later_count > 0,
        "expected the source arrow to have been throttled at least once"
    );
}
