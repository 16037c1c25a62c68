use std::collections::HashMap;
use std::sync::Mutex;

use jana_core::{EngineResult, Event, FoldStatus, Folder};

/// Inverse of [`super::ChildCountUnfolder`]: accumulates children into a
/// parent until `target` have been folded in, then reports `Complete`.
pub struct ChildCountFolder {
    target: usize,
    progress: Mutex<HashMap<usize, usize>>,
}

impl ChildCountFolder {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            progress: Mutex::new(HashMap::new()),
        }
    }
}

impl Folder for ChildCountFolder {
    fn fold(&mut self, parent: &Event, _child: &Event) -> EngineResult<FoldStatus> {
        let mut progress = self.progress.lock().expect("fold progress poisoned");
        let count = progress.entry(parent.slot()).or_insert(0);
        *count += 1;
        if *count >= self.target {
            progress.remove(&parent.slot());
            Ok(FoldStatus::Complete)
        } else {
            Ok(FoldStatus::KeepAccumulating)
        }
    }
}
