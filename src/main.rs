//! Demo binary: builds a small multi-level topology (a source feeding an
//! unfold/fold pair around a physics-event map stage) and runs it to
//! completion, printing a short summary. Exercises more of the engine than
//! `jana-cli` (which only has the linear source -> map -> sink pipeline).

use std::sync::Arc;

use jana_components::demo::{ChildCountFolder, ChildCountUnfolder, CountingSink, CountingSource, PassThroughProcessor};
use jana_core::{Arrow, EngineConfig, EventPool, ExecutionEngine, Level, Queue, Topology};
use jana_policies::BackoffPolicy;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = EngineConfig::from_env();
    config.nthreads = config.nthreads.max(2);

    const RUN_COUNT: u64 = 50;
    const CHILDREN_PER_RUN: usize = 3;

    let run_pool = Arc::new(EventPool::new(config.event_pool_size, config.locality, config.limit_total_events_in_flight, Level::Run));
    let event_pool = Arc::new(EventPool::new(
        config.event_pool_size,
        config.locality,
        config.limit_total_events_in_flight,
        Level::PhysicsEvent,
    ));

    let source_to_unfold = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));
    let unfold_to_map = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));
    let map_to_fold = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));
    let fold_to_sink = Arc::new(Queue::new(config.event_queue_threshold * 2, config.event_queue_threshold, config.locality));

    let source = Arrow::source(
        "run_source",
        vec![Box::new(CountingSource::new(1, RUN_COUNT))],
        run_pool.clone(),
        source_to_unfold.clone(),
        config.event_source_chunksize,
    );

    let unfold = Arrow::unfold(
        "split_into_events",
        Box::new(ChildCountUnfolder::new(CHILDREN_PER_RUN)),
        Level::Run,
        source_to_unfold,
        run_pool.clone(),
        event_pool.clone(),
        unfold_to_map.clone(),
    );

    let map = Arrow::map(
        "reconstruct",
        vec![Box::new(PassThroughProcessor::new("reconstruct"))],
        unfold_to_map,
        map_to_fold.clone(),
        true,
    );

    let fold = Arrow::fold(
        "merge_into_run",
        Box::new(ChildCountFolder::new(CHILDREN_PER_RUN)),
        Level::Run,
        map_to_fold,
        event_pool.clone(),
        fold_to_sink.clone(),
    );

    let sink = Arrow::sink("run_sink", Box::new(CountingSink::new()), fold_to_sink, run_pool.clone());

    let mut topology = Topology::new();
    topology.add_pool(run_pool);
    topology.add_pool(event_pool);
    let source_idx = topology.add_arrow(Arc::new(source));
    let unfold_idx = topology.add_arrow(Arc::new(unfold));
    let map_idx = topology.add_arrow(Arc::new(map));
    let fold_idx = topology.add_arrow(Arc::new(fold));
    let sink_idx = topology.add_arrow(Arc::new(sink));
    topology.add_edge(source_idx, unfold_idx);
    topology.add_edge(unfold_idx, map_idx);
    topology.add_edge(map_idx, fold_idx);
    topology.add_edge(fold_idx, sink_idx);

    let backoff: Arc<dyn jana_core::BackoffStrategy> = BackoffPolicy::Linear { base_millis: 1, cap_millis: 20 }.build().into();

    let engine = ExecutionEngine::new(topology, config, backoff);
    let exit = engine.run();
    let perf = engine.perf();

    println!("run finished with {:?}", exit);
    println!("runs merged back: {}", perf.events_processed);
    for arrow in &perf.arrows {
        println!(
            "  {:<16} fired={:<6} keep_going={:<6} errors={}",
            arrow.name, arrow.metrics.fire_count, arrow.metrics.keep_going_count, arrow.metrics.error_count
        );
    }

    std::process::exit(exit.as_process_code());
}
