use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::errors::EngineResult;
use crate::event::Event;

/// User-provided producer of a typed collection, keyed by `(type, tag)` on a
/// given Event. `Init` runs at most once per factory instance; `Process`
/// runs again on every Event cycle unless a prior `Insert` short-circuits it
/// (see the `Regenerate` flag).
pub trait Factory<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Runs once for the lifetime of this factory instance.
    fn init(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Fires when the current Event's run number differs from the last run
    /// this factory observed.
    fn change_run(&mut self, _event: &Event) -> EngineResult<()> {
        Ok(())
    }

    /// Produces this Event's collection.
    fn process(&mut self, event: &Event) -> EngineResult<Vec<T>>;

    /// Called on `Clear`, before state resets to `Empty` (unless persistent).
    fn clear_data(&mut self) {}

    /// Survives `Clear()` instead of resetting to `Empty`.
    fn persistent(&self) -> bool {
        false
    }

    /// Skips dropping contained objects on clear/replace (non-owning output).
    fn not_owner(&self) -> bool {
        false
    }

    /// When set, `Process` always re-runs even if an upstream `Insert`
    /// already populated this factory's output for the current Event.
    fn regenerate(&self) -> bool {
        false
    }
}

/// Object-safe, type-erased view of a [`Factory`], so a [`super::FactorySet`]
/// can hold a heterogeneous map of factories keyed by `(TypeId, tag)`.
pub(crate) trait ErasedFactory: Send + Sync {
    fn init(&self) -> EngineResult<()>;
    fn change_run(&self, event: &Event) -> EngineResult<()>;
    fn process(&self, event: &Event) -> EngineResult<Arc<dyn Any + Send + Sync>>;
    fn clear_data(&self);
    fn persistent(&self) -> bool;
    fn not_owner(&self) -> bool;
    fn regenerate(&self) -> bool;
}

pub(crate) struct FactoryCell<T, F> {
    inner: Mutex<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FactoryCell<T, F>
where
    T: Send + Sync + 'static,
    F: Factory<T> + 'static,
{
    pub(crate) fn new(factory: F) -> Self {
        Self {
            inner: Mutex::new(factory),
            _marker: PhantomData,
        }
    }
}

impl<T, F> ErasedFactory for FactoryCell<T, F>
where
    T: Send + Sync + 'static,
    F: Factory<T> + 'static,
{
    fn init(&self) -> EngineResult<()> {
        self.inner.lock().expect("factory mutex poisoned").init()
    }

    fn change_run(&self, event: &Event) -> EngineResult<()> {
        self.inner.lock().expect("factory mutex poisoned").change_run(event)
    }

    fn process(&self, event: &Event) -> EngineResult<Arc<dyn Any + Send + Sync>> {
        let items = self.inner.lock().expect("factory mutex poisoned").process(event)?;
        Ok(Arc::new(items) as Arc<dyn Any + Send + Sync>)
    }

    fn clear_data(&self) {
        self.inner.lock().expect("factory mutex poisoned").clear_data();
    }

    fn persistent(&self) -> bool {
        self.inner.lock().expect("factory mutex poisoned").persistent()
    }

    fn not_owner(&self) -> bool {
        self.inner.lock().expect("factory mutex poisoned").not_owner()
    }

    fn regenerate(&self) -> bool {
        self.inner.lock().expect("factory mutex poisoned").regenerate()
    }
}
