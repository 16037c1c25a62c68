use std::any::Any;
use std::sync::{Arc, Mutex};

use tracing::trace;

use super::factory::ErasedFactory;
use super::state::FactoryState;
use crate::errors::{EngineError, EngineResult};
use crate::event::Event;

/// One `(type, tag)` slot inside a [`super::FactorySet`]. Owns the single
/// mutex that serialises concurrent `Get`s against this factory, per §4.2:
/// "different factories on the same Event run concurrently if invoked via
/// parallel sub-requests".
pub(crate) struct FactoryRecord {
    label: String,
    factory: Arc<dyn ErasedFactory>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: FactoryState,
    initialized_once: bool,
    recorded_run: i64,
    data: Option<Arc<dyn Any + Send + Sync>>,
    got: bool,
}

impl FactoryRecord {
    pub(crate) fn new(label: String, factory: Arc<dyn ErasedFactory>) -> Self {
        Self {
            label,
            factory,
            inner: Mutex::new(Inner {
                state: FactoryState::Empty,
                initialized_once: false,
                recorded_run: i64::MIN,
                data: None,
                got: false,
            }),
        }
    }

    pub(crate) fn state(&self) -> FactoryState {
        self.inner.lock().expect("factory record poisoned").state
    }

    /// Drives the factory to `Processed` or `Inserted` and returns its
    /// output, per the dispatch order in §4.1: already-`Inserted` short
    /// circuits; otherwise `Init` (once) then `Process` runs under this
    /// record's lock, so concurrent callers on the same factory serialise.
    pub(crate) fn get_or_process(&self, event: &Event) -> EngineResult<Arc<dyn Any + Send + Sync>> {
        let mut guard = self.inner.lock().expect("factory record poisoned");
        guard.got = true;

        if guard.state.has_output() && !(guard.state == FactoryState::Inserted && self.factory.regenerate()) {
            if let Some(data) = guard.data.clone() {
                return Ok(data);
            }
        }

        if !guard.initialized_once {
            self.factory.init().map_err(|e| annotate(&self.label, e))?;
            guard.initialized_once = true;
            guard.state = FactoryState::Initialized;
        }

        if guard.recorded_run != event.run_number() {
            self.factory.change_run(event).map_err(|e| annotate(&self.label, e))?;
            guard.recorded_run = event.run_number();
        }

        trace!(factory = %self.label, "processing");
        let data = self.factory.process(event).map_err(|e| annotate(&self.label, e))?;
        guard.data = Some(data.clone());
        guard.state = FactoryState::Processed;
        Ok(data)
    }

    /// Externally supplied collection. Short-circuits `Process` unless the
    /// factory's `Regenerate` flag is set (§9 open question (a)).
    pub(crate) fn insert(&self, data: Arc<dyn Any + Send + Sync>) -> EngineResult<()> {
        let mut guard = self.inner.lock().expect("factory record poisoned");
        if guard.got && guard.state.has_output() {
            return Err(EngineError::AlreadyProduced {
                key: self.label.clone(),
            });
        }
        guard.data = Some(data);
        guard.state = FactoryState::Inserted;
        Ok(())
    }

    /// Releases factory state; respects the persistent flag by leaving
    /// contents and state untouched.
    pub(crate) fn clear(&self) {
        if self.factory.persistent() {
            return;
        }
        let mut guard = self.inner.lock().expect("factory record poisoned");
        if !self.factory.not_owner() {
            self.factory.clear_data();
        }
        guard.data = None;
        guard.state = FactoryState::Empty;
        guard.got = false;
    }
}

fn annotate(label: &str, source: EngineError) -> EngineError {
    match source {
        EngineError::ComponentExecutionFailure { .. } | EngineError::ComponentInitFailure { .. } => source,
        other => EngineError::ComponentExecutionFailure {
            plugin: "factory".to_string(),
            component: label.to_string(),
            event_id: 0,
            source: other.to_string(),
        },
    }
}
