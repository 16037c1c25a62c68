use std::any::{Any, TypeId};
use std::sync::Arc;

use indexmap::IndexMap;

use super::factory::{ErasedFactory, Factory, FactoryCell};
use super::record::FactoryRecord;
use super::state::FactoryState;
use crate::errors::{EngineError, EngineResult};
use crate::event::Event;

type FactoryKey = (TypeId, String);

/// Mapping `(type-id, tag) → Factory`, plus a parallel `name → key` index
/// for name-addressable collections (`GetCollection`). Both indices are
/// kept consistent by construction: the name index is only ever populated
/// alongside a `(TypeId, tag)` registration.
#[derive(Default)]
pub struct FactorySet {
    factories: IndexMap<FactoryKey, Arc<FactoryRecord>>,
    by_name: IndexMap<String, FactoryKey>,
}

impl FactorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user factory under `(T, tag)`, optionally addressable by
    /// `name` as well.
    pub fn register<T, F>(&mut self, tag: &str, name: Option<&str>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Factory<T> + 'static,
    {
        let key: FactoryKey = (TypeId::of::<T>(), tag.to_string());
        let label = format!("{}<{}>", std::any::type_name::<T>(), tag);
        let erased: Arc<dyn ErasedFactory> = Arc::new(FactoryCell::new(factory));
        self.factories.insert(key.clone(), Arc::new(FactoryRecord::new(label, erased)));
        if let Some(name) = name {
            self.by_name.insert(name.to_string(), key);
        }
    }

    pub fn state_of<T: 'static>(&self, tag: &str) -> Option<FactoryState> {
        let key = (TypeId::of::<T>(), tag.to_string());
        self.factories.get(&key).map(|r| r.state())
    }

    /// Drives the `(T, tag)` factory and returns its typed output, or
    /// `None` if no such factory is registered (caller falls back to the
    /// source's `get_objects` hook, then an empty view, per §4.1).
    pub(crate) fn get<T>(&self, tag: &str, event: &Event) -> EngineResult<Option<Arc<Vec<T>>>>
    where
        T: Send + Sync + 'static,
    {
        let key = (TypeId::of::<T>(), tag.to_string());
        let Some(record) = self.factories.get(&key) else {
            return Ok(None);
        };
        let erased = record.get_or_process(event)?;
        Ok(Some(downcast::<T>(erased)))
    }

    pub fn get_collection<T>(&self, name: &str, event: &Event) -> EngineResult<Option<Arc<Vec<T>>>>
    where
        T: Send + Sync + 'static,
    {
        let Some((_, tag)) = self.by_name.get(name) else {
            return Ok(None);
        };
        self.get::<T>(tag, event)
    }

    /// Externally supplies `(T, tag)`'s output, bypassing `Process` unless
    /// the factory's `Regenerate` flag is set. The `(T, tag)` factory must
    /// already be registered — `Insert` does not create name bindings; that
    /// happens once, at `register` time.
    pub fn insert<T>(&self, tag: &str, data: Vec<T>) -> EngineResult<()>
    where
        T: Send + Sync + 'static,
    {
        let key: FactoryKey = (TypeId::of::<T>(), tag.to_string());
        let Some(record) = self.factories.get(&key) else {
            return Err(EngineError::Internal(format!(
                "Insert on unregistered factory key (tag={tag})"
            )));
        };
        record.insert(Arc::new(data) as Arc<dyn Any + Send + Sync>)
    }

    pub fn clear_all(&self) {
        for record in self.factories.values() {
            record.clear();
        }
    }
}

fn downcast<T: Send + Sync + 'static>(erased: Arc<dyn Any + Send + Sync>) -> Arc<Vec<T>> {
    erased
        .downcast::<Vec<T>>()
        .unwrap_or_else(|_| panic!("factory output type mismatch for {}", std::any::type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::identity::Level;

    struct AData(i32);
    struct BData(i32);

    struct FactoryA;
    impl Factory<AData> for FactoryA {
        fn process(&mut self, event: &Event) -> EngineResult<Vec<AData>> {
            event.get::<BData>("b")?;
            Ok(vec![AData(1)])
        }
    }

    struct FactoryB;
    impl Factory<BData> for FactoryB {
        fn process(&mut self, event: &Event) -> EngineResult<Vec<BData>> {
            event.get::<AData>("a")?;
            Ok(vec![BData(1)])
        }
    }

    /// Scenario: Factory A calls B which calls A on the same event (spec.md
    /// §8, "Factory cycle").
    #[test]
    fn mutually_recursive_factories_raise_infinite_recursion() {
        let mut event = Event::new(0, 0, Level::PhysicsEvent);
        event.register_factory::<AData, _>("a", None, FactoryA);
        event.register_factory::<BData, _>("b", None, FactoryB);

        let err = event.get::<AData>("a").unwrap_err();
        match err {
            EngineError::InfiniteRecursion { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert!(cycle[0].contains("AData"));
                assert!(cycle[1].contains("BData"));
                assert_eq!(cycle[0], cycle[2]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn insert_short_circuits_process() {
        let mut event = Event::new(0, 0, Level::PhysicsEvent);
        event.register_factory::<AData, _>("a", Some("a_name"), FactoryA);
        // Bypasses FactoryA::process (which would otherwise try to reach B
        // and fail outside this test's registration of B).
        event.insert("a", vec![AData(42)]).unwrap();
        let got = event.get::<AData>("a").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, 42);
    }
}
