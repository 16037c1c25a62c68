//! Command-line entry point: wires a demo topology together from
//! `jana-components`, configures the engine from the environment, and runs
//! it to completion.

use std::sync::Arc;
use std::time::Duration;

use jana_components::demo::{CountingSink, CountingSource, PassThroughProcessor};
use jana_core::{Arrow, EngineConfig, EventPool, ExecutionEngine, Level, Queue, Topology};
use jana_policies::BackoffPolicy;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env();
    let event_count: u64 = std::env::var("JANA_DEMO_EVENT_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000);

    let topology = build_topology(&config, event_count);
    let backoff: Arc<dyn jana_core::BackoffStrategy> = BackoffPolicy::Exponential {
        base_millis: 1,
        cap_millis: config.backoff_cap.as_millis() as u64,
    }
    .build()
    .into();

    let engine = ExecutionEngine::new(topology, config, backoff);
    info!("starting jana2 demo run");
    let exit = engine.run();

    let perf = engine.perf();
    info!(
        events_processed = perf.events_processed,
        elapsed_ms = perf.elapsed.as_millis() as u64,
        lifetime_hz = perf.lifetime_throughput_hz,
        "run finished"
    );
    for arrow in &perf.arrows {
        info!(arrow = %arrow.name, fired = arrow.metrics.keep_going_count, errors = arrow.metrics.error_count, "arrow summary");
    }

    std::process::exit(exit.as_process_code());
}

fn build_topology(config: &EngineConfig, event_count: u64) -> Topology {
    let pool = Arc::new(EventPool::new(
        config.event_pool_size,
        config.locality,
        config.limit_total_events_in_flight,
        Level::PhysicsEvent,
    ));

    let source_to_map = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));
    let map_to_sink = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));

    let source = Arrow::source(
        "source",
        vec![Box::new(CountingSource::new(1, event_count))],
        pool.clone(),
        source_to_map.clone(),
        config.event_source_chunksize,
    );

    let map = Arrow::map(
        "map",
        vec![Box::new(PassThroughProcessor::new("map").with_busy_work(Duration::from_micros(50)))],
        source_to_map,
        map_to_sink.clone(),
        true,
    );

    let sink = Arrow::sink("sink", Box::new(CountingSink::new()), map_to_sink, pool.clone());

    let mut topology = Topology::new();
    topology.add_pool(pool);
    let source_idx = topology.add_arrow(Arc::new(source));
    let map_idx = topology.add_arrow(Arc::new(map));
    let sink_idx = topology.add_arrow(Arc::new(sink));
    topology.add_edge(source_idx, map_idx);
    topology.add_edge(map_idx, sink_idx);
    topology
}
