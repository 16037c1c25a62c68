//! Unfold/fold round-trip scenario (spec.md §8, scenario 6): a parent
//! splits into 3 children, the fold arrow merges all 3 back, and the parent
//! is released to its pool exactly once with the refcount history
//! `0 -> 1 (created) -> 2,3,4 (children added) -> ... -> 0 (recycled)`.
//!
//! Driven by calling `Arrow::execute` directly (no worker threads) so the
//! refcount can be sampled deterministically between invocations.

use std::sync::Arc;

use jana_components::demo::{ChildCountFolder, ChildCountUnfolder};
use jana_core::{Arrow, EventPool, FireResult, Level, Queue};

#[test]
fn parent_refcount_round_trips_through_unfold_and_fold() {
    const CHILDREN: usize = 3;

    let run_pool = EventPool::new(4, 1, true, Level::Run);
    let event_pool = Arc::new(EventPool::new(8, 1, true, Level::PhysicsEvent));

    let q_in = Arc::new(Queue::new(4, 4, 1));
    let q_mid = Arc::new(Queue::new(8, 8, 1));
    let q_out = Arc::new(Queue::new(4, 4, 1));

    let parent = run_pool.get(0).expect("fresh parent event");
    assert_eq!(parent.refcount(), 1, "freshly checked-out event starts at refcount 1");
    q_in.push(vec![parent.clone()], 0).expect("room for one parent");

    let run_pool = Arc::new(run_pool);
    let unfold = Arrow::unfold(
        "split",
        Box::new(ChildCountUnfolder::new(CHILDREN)),
        Level::Run,
        q_in,
        run_pool.clone(),
        event_pool.clone(),
        q_mid.clone(),
    );

    let mut expected_refcount = 1;
    for i in 0..CHILDREN {
        match unfold.execute(0) {
            FireResult::KeepGoing => {}
            other => panic!("expected KeepGoing while emitting child {i}, got {other:?}"),
        }
        expected_refcount += 1;
        assert_eq!(parent.refcount(), expected_refcount, "refcount after child {i} added");
    }
    assert_eq!(parent.refcount(), 1 + CHILDREN, "peak refcount after all children added");

    // Unfolder reports no more children: the arrow releases its own
    // processing hold on the parent.
    match unfold.execute(0) {
        FireResult::KeepGoing => {}
        other => panic!("expected KeepGoing on the finishing call, got {other:?}"),
    }
    assert_eq!(parent.refcount(), CHILDREN, "unfold's own release pays down one hold");
    assert_eq!(q_mid.len(0), CHILDREN, "all three children reached the fold-bound queue");

    let fold = Arrow::fold("merge", Box::new(ChildCountFolder::new(CHILDREN)), Level::Run, q_mid, event_pool.clone(), q_out.clone());

    for i in 0..CHILDREN - 1 {
        match fold.execute(0) {
            FireResult::KeepGoing => {}
            other => panic!("expected KeepGoing while folding child {i}, got {other:?}"),
        }
    }
    assert_eq!(parent.refcount(), 1, "one child left outstanding before the final fold");

    // The final child completes the fold: the arrow hands the parent back
    // to the pipeline with a single fresh ownership hold.
    match fold.execute(0) {
        FireResult::KeepGoing => {}
        other => panic!("expected KeepGoing on the completing fold call, got {other:?}"),
    }
    assert_eq!(parent.refcount(), 1, "parent re-enters the pipeline with exactly one hold");
    assert_eq!(q_out.len(0), 1, "completed parent was committed downstream");
    assert_eq!(event_pool.idle_count(), CHILDREN, "all three children recycled back to their pool");

    let delivered = q_out.pop(1, 1, 0);
    assert_eq!(delivered.len(), 1);
    run_pool.release(delivered.into_iter().next().unwrap(), 0);

    assert_eq!(parent.refcount(), 0, "parent recycled exactly once");
    assert_eq!(run_pool.idle_count(), 4, "run pool fully restored to capacity");
}
