use std::collections::HashMap;
use std::sync::Mutex;

use jana_core::{EngineResult, Event, Unfolder, UnfoldStatus};

/// Emits exactly `children_per_parent` children for each parent, then
/// reports `FinishedWithParent` on the next call — the arrow discards that
/// call's lookahead child and releases the parent (§4.6). Keyed by the
/// parent's pool slot, which is stable for as long as the parent stays
/// checked out (it isn't recycled until this unfolder releases it).
pub struct ChildCountUnfolder {
    children_per_parent: usize,
    progress: Mutex<HashMap<usize, usize>>,
}

impl ChildCountUnfolder {
    pub fn new(children_per_parent: usize) -> Self {
        Self {
            children_per_parent,
            progress: Mutex::new(HashMap::new()),
        }
    }
}

impl Unfolder for ChildCountUnfolder {
    fn unfold(&mut self, parent: &Event, child: &Event) -> EngineResult<UnfoldStatus> {
        let mut progress = self.progress.lock().expect("unfold progress poisoned");
        let so_far = *progress.get(&parent.slot()).unwrap_or(&0);

        if so_far >= self.children_per_parent {
            progress.remove(&parent.slot());
            return Ok(UnfoldStatus::FinishedWithParent);
        }

        let next = so_far + 1;
        progress.insert(parent.slot(), next);
        child.set_run_number(parent.run_number());
        child.set_event_number(parent.event_number() * 1000 + next as u64);
        Ok(UnfoldStatus::NextChildReady)
    }
}
