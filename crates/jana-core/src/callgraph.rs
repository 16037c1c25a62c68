//! Per-event record of which factory invoked which, used to detect cycles
//! and to produce a deterministic replay order.

use std::sync::Mutex;

use indexmap::{IndexMap, IndexSet};

use crate::errors::{EngineError, EngineResult};

/// Where a factory invocation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    Source,
    Factory,
}

#[derive(Debug, Clone)]
struct CallEdge {
    callee: String,
    #[allow(dead_code)]
    origin: CallOrigin,
}

/// Records directed edges "caller factory → callee factory" the first time
/// a factory, mid-execution, requests another. The active call stack
/// doubles as the cycle detector: a `Get` that re-enters a factory already
/// on the stack is a back-edge.
#[derive(Default)]
pub struct CallGraphRecorder {
    stack: Mutex<Vec<String>>,
    edges: Mutex<IndexMap<String, Vec<CallEdge>>>,
}

/// Pops the call stack entry on drop, whether `enter` ultimately succeeded
/// or the caller unwinds via `?`.
pub struct CallGuard<'a> {
    recorder: &'a CallGraphRecorder,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.recorder.stack.lock().expect("callgraph stack poisoned").pop();
    }
}

impl CallGraphRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters `callee`, recording an edge from the current top of the call
    /// stack (if any). Returns `InfiniteRecursion` if `callee` is already
    /// on the stack, annotated with the full cycle.
    pub fn enter(&self, callee: &str, origin: CallOrigin) -> EngineResult<CallGuard<'_>> {
        let mut stack = self.stack.lock().expect("callgraph stack poisoned");
        if let Some(pos) = stack.iter().position(|s| s == callee) {
            let mut cycle: Vec<String> = stack[pos..].to_vec();
            cycle.push(callee.to_string());
            return Err(EngineError::InfiniteRecursion { cycle });
        }
        if let Some(caller) = stack.last().cloned() {
            self.edges
                .lock()
                .expect("callgraph edges poisoned")
                .entry(caller)
                .or_default()
                .push(CallEdge {
                    callee: callee.to_string(),
                    origin,
                });
        }
        stack.push(callee.to_string());
        drop(stack);
        Ok(CallGuard { recorder: self })
    }

    /// A linearisation consistent with caller→callee edges (Kahn's
    /// algorithm); ties are broken by insertion order. Rejects cyclic
    /// graphs, though `enter` should already have prevented one from being
    /// recorded.
    pub fn topological_sort(&self) -> EngineResult<Vec<String>> {
        let edges = self.edges.lock().expect("callgraph edges poisoned");

        let mut nodes: IndexSet<String> = IndexSet::new();
        for (caller, callees) in edges.iter() {
            nodes.insert(caller.clone());
            for edge in callees {
                nodes.insert(edge.callee.clone());
            }
        }

        let mut indegree: IndexMap<String, usize> = nodes.iter().cloned().map(|n| (n, 0)).collect();
        for callees in edges.values() {
            for edge in callees {
                *indegree.get_mut(&edge.callee).expect("node indexed above") += 1;
            }
        }

        let mut ready: Vec<String> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| n.clone())
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while !ready.is_empty() {
            let node = ready.remove(0);
            order.push(node.clone());
            if let Some(callees) = edges.get(&node) {
                for edge in callees {
                    let deg = indegree.get_mut(&edge.callee).expect("node indexed above");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(edge.callee.clone());
                    }
                }
            }
        }

        if order.len() != nodes.len() {
            return Err(EngineError::InfiniteRecursion {
                cycle: nodes.into_iter().collect(),
            });
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_sorts_caller_before_callee() {
        let recorder = CallGraphRecorder::new();
        {
            let _a = recorder.enter("A", CallOrigin::Source).unwrap();
            let _b = recorder.enter("B", CallOrigin::Factory).unwrap();
        }
        let order = recorder.topological_sort().unwrap();
        assert_eq!(order, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn reentrant_call_is_detected_as_a_cycle() {
        let recorder = CallGraphRecorder::new();
        let _a = recorder.enter("A", CallOrigin::Factory).unwrap();
        let _b = recorder.enter("B", CallOrigin::Factory).unwrap();
        let err = recorder.enter("A", CallOrigin::Factory).unwrap_err();
        match err {
            EngineError::InfiniteRecursion { cycle } => {
                assert_eq!(cycle, vec!["A".to_string(), "B".to_string(), "A".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
