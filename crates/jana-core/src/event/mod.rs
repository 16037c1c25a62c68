//! The Event: per-event identity, parent chain, FactorySet and call-graph
//! recorder.

mod hook;

pub use hook::ObjectHook;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::callgraph::{CallGraphRecorder, CallOrigin};
use crate::errors::{EngineError, EngineResult};
use crate::factory::{Factory, FactorySet};
use crate::identity::{EventIdentity, Level};

/// Shared handle to an Event. Cloning an `EventHandle` does not itself
/// change the domain reference count (see [`Event::add_parent`]) — it is a
/// plain `Arc` clone for memory-safety purposes only.
pub type EventHandle = Arc<Event>;

struct ParentLink {
    level: Level,
    parent: EventHandle,
}

/// The central unit of work. Identity, parent chain, lazily-computed
/// per-event data (`FactorySet`) and the call-graph recorder that observes
/// it.
///
/// Invariants upheld by this type: parent-chain levels strictly increase up
/// the chain (enforced in [`Event::add_parent`]); the reference count is
/// never decremented below zero (checked with a debug assertion, since an
/// underflow here is a bookkeeping bug, not user error).
pub struct Event {
    slot: usize,
    location: usize,
    identity: Mutex<EventIdentity>,
    parent_chain: Mutex<Vec<ParentLink>>,
    refcount: AtomicUsize,
    factories: FactorySet,
    call_graph: CallGraphRecorder,
    object_hook: Option<Arc<dyn ObjectHook>>,
}

impl Event {
    pub(crate) fn new(slot: usize, location: usize, level: Level) -> Self {
        Self {
            slot,
            location,
            identity: Mutex::new(EventIdentity::unknown(level)),
            parent_chain: Mutex::new(Vec::new()),
            refcount: AtomicUsize::new(0),
            factories: FactorySet::new(),
            call_graph: CallGraphRecorder::new(),
            object_hook: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn location(&self) -> usize {
        self.location
    }

    pub fn identity(&self) -> EventIdentity {
        *self.identity.lock().expect("identity mutex poisoned")
    }

    pub fn run_number(&self) -> i64 {
        self.identity().run_number
    }

    pub fn event_number(&self) -> u64 {
        self.identity().event_number
    }

    pub fn level(&self) -> Level {
        self.identity().level
    }

    pub fn set_event_number(&self, n: u64) {
        self.identity.lock().expect("identity mutex poisoned").event_number = n;
    }

    pub fn set_run_number(&self, n: i64) {
        self.identity.lock().expect("identity mutex poisoned").run_number = n;
    }

    pub fn set_level(&self, level: Level) {
        self.identity.lock().expect("identity mutex poisoned").level = level;
    }

    pub fn call_graph(&self) -> &CallGraphRecorder {
        &self.call_graph
    }

    pub fn factories(&self) -> &FactorySet {
        &self.factories
    }

    pub fn factories_mut(&mut self) -> &mut FactorySet {
        &mut self.factories
    }

    pub fn set_object_hook(&mut self, hook: Arc<dyn ObjectHook>) {
        self.object_hook = Some(hook);
    }

    /// Registers a factory for `(T, tag)`. Called once, when the Event slot
    /// is first built by the pool's factory generator — factories persist
    /// across recycles, only their data is reset by `Clear`.
    pub fn register_factory<T, F>(&mut self, tag: &str, name: Option<&str>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Factory<T> + 'static,
    {
        self.factories.register(tag, name, factory);
    }

    /// Resolves in the order specified by §4.1: an already-`Inserted`
    /// collection short-circuits; otherwise the matching factory is driven
    /// through its state machine; otherwise the source's object hook is
    /// consulted; otherwise an empty view is returned (not an error).
    pub fn get<T>(&self, tag: &str) -> EngineResult<Arc<Vec<T>>>
    where
        T: Send + Sync + 'static,
    {
        let label = format!("{}<{}>", std::any::type_name::<T>(), tag);
        let _guard = self.call_graph.enter(&label, CallOrigin::Factory)?;

        if let Some(data) = self.factories.get::<T>(tag, self)? {
            return Ok(data);
        }

        if let Some(hook) = &self.object_hook {
            trace!(event = self.slot, %label, "falling back to source object hook");
            if let Some(boxed) = hook.get_objects(self, std::any::type_name::<T>(), tag) {
                if let Ok(vec) = boxed.downcast::<Vec<T>>() {
                    return Ok(Arc::new(*vec));
                }
            }
        }

        Ok(Arc::new(Vec::new()))
    }

    pub fn get_collection<T>(&self, name: &str) -> EngineResult<Arc<Vec<T>>>
    where
        T: Send + Sync + 'static,
    {
        if let Some(data) = self.factories.get_collection::<T>(name, self)? {
            return Ok(data);
        }
        Ok(Arc::new(Vec::new()))
    }

    pub fn get_factory_state<T: 'static>(&self, tag: &str) -> Option<crate::factory::FactoryState> {
        self.factories.state_of::<T>(tag)
    }

    pub fn insert<T>(&self, tag: &str, data: Vec<T>) -> EngineResult<()>
    where
        T: Send + Sync + 'static,
    {
        self.factories.insert(tag, data)
    }

    /// Links `self` as a child of `parent` at `level`, incrementing the
    /// parent's reference count. Rejects a duplicate level or an
    /// out-of-order (non-strictly-coarser) parent level.
    pub fn add_parent(&self, level: Level, parent: EventHandle) -> EngineResult<()> {
        let mut chain = self.parent_chain.lock().expect("parent chain poisoned");
        if chain.iter().any(|link| link.level == level) {
            return Err(EngineError::Internal(format!("duplicate parent level {level}")));
        }
        if let Some(last) = chain.last() {
            if !last.level.is_coarser_than(level) {
                return Err(EngineError::Internal(format!(
                    "parent levels must strictly increase up the chain (got {level} after {})",
                    last.level
                )));
            }
        }
        parent.refcount.fetch_add(1, Ordering::AcqRel);
        chain.push(ParentLink { level, parent });
        Ok(())
    }

    /// Releases the parent link at `level`, decrementing that parent's
    /// reference count. Returns the parent handle and whether its count
    /// just reached zero (the caller is then responsible for recycling it
    /// via the originating [`crate::pool::EventPool`]).
    pub fn release_parent(&self, level: Level) -> Option<(EventHandle, bool)> {
        let mut chain = self.parent_chain.lock().expect("parent chain poisoned");
        let pos = chain.iter().position(|link| link.level == level)?;
        let link = chain.remove(pos);
        let now_zero = link.parent.dec_refcount() == 0;
        Some((link.parent, now_zero))
    }

    /// Current reference count (parent links pointing at this Event, plus
    /// one while it is checked out of the pool).
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn set_refcount(&self, value: usize) {
        self.refcount.store(value, Ordering::Release);
    }

    pub(crate) fn inc_refcount(&self) -> usize {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements and returns the new count. Used both to release the
    /// pool's own in-flight hold (by a sink) and to release a parent link
    /// (by a finishing child).
    pub fn dec_refcount(&self) -> usize {
        let prev = self.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "Event refcount underflow on slot {}", self.slot);
        prev - 1
    }

    /// Releases factory state (respecting the persistent flag) and clears
    /// the parent chain and call graph, retaining configuration/registration.
    pub fn clear(&self) {
        self.factories.clear_all();
        self.parent_chain.lock().expect("parent chain poisoned").clear();
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("slot", &self.slot)
            .field("identity", &self.identity())
            .field("refcount", &self.refcount())
            .finish()
    }
}
