//! The arrow/queue/pool graph plus activation propagation.

use std::sync::Arc;

use tracing::info;

use crate::arrow::Arrow;
use crate::pool::EventPool;

/// The wiring between two arrows: `producer`'s output queue is `consumer`'s
/// input queue. Used to propagate `upstream_finished` once a producer
/// finalises.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub producer: usize,
    pub consumer: usize,
}

/// Invariants (checked by [`Topology::validate`]): the arrows form a DAG;
/// every queue's producer/consumer are set; no arrow feeds itself.
pub struct Topology {
    arrows: Vec<Arc<Arrow>>,
    edges: Vec<Edge>,
    pools: Vec<Arc<EventPool>>,
}

impl Topology {
    pub fn new() -> Self {
        Self {
            arrows: Vec::new(),
            edges: Vec::new(),
            pools: Vec::new(),
        }
    }

    pub fn add_pool(&mut self, pool: Arc<EventPool>) {
        self.pools.push(pool);
    }

    pub fn add_arrow(&mut self, arrow: Arc<Arrow>) -> usize {
        self.arrows.push(arrow);
        self.arrows.len() - 1
    }

    /// Declares that `producer`'s output feeds `consumer`'s input.
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        self.edges.push(Edge { producer, consumer });
    }

    pub fn arrows(&self) -> &[Arc<Arrow>] {
        &self.arrows
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn pools(&self) -> &[Arc<EventPool>] {
        &self.pools
    }

    /// No arrow has an edge back to itself, and no two edges claim the same
    /// consumer from two different producer sets in a way that would leave
    /// the consumer's upstream-finished state ambiguous is out of scope for
    /// this check: we only check the acyclicity and self-loop invariants
    /// that are cheap to verify structurally.
    pub fn validate(&self) -> Result<(), String> {
        for edge in &self.edges {
            if edge.producer == edge.consumer {
                return Err(format!("arrow {} feeds itself", self.arrows[edge.producer].name()));
            }
        }
        let mut indegree = vec![0usize; self.arrows.len()];
        for edge in &self.edges {
            indegree[edge.consumer] += 1;
        }
        let mut ready: Vec<usize> = (0..self.arrows.len()).filter(|&i| indegree[i] == 0).collect();
        let mut visited = 0;
        while let Some(n) = ready.pop() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.producer == n) {
                indegree[edge.consumer] -= 1;
                if indegree[edge.consumer] == 0 {
                    ready.push(edge.consumer);
                }
            }
        }
        if visited != self.arrows.len() {
            return Err("topology graph is not acyclic".to_string());
        }
        Ok(())
    }

    /// Activates all source arrows. Non-source arrows are active from the
    /// start of the run too: their eligibility to fire is already gated by
    /// their input queues being non-empty, so a separate lazy-activation
    /// signal adds no information the queue state doesn't already carry.
    pub fn activate(&self) {
        for arrow in &self.arrows {
            arrow.activate();
        }
        info!(arrow_count = self.arrows.len(), "topology activated");
    }

    /// All arrows have reached their finalized state.
    pub fn is_drained(&self) -> bool {
        self.arrows.iter().all(|a| a.is_finished())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}
