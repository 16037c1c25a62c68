//! Location-partitioned, bounded freelist of reusable Events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::errors::{EngineError, EngineResult};
use crate::event::{Event, EventHandle};
use crate::identity::Level;

struct LocalPool {
    capacity: usize,
    free: VecDeque<EventHandle>,
}

/// Fixed-capacity, per-location array of freelists of Event objects.
/// Capacity is adjustable only when every local freelist is full (§4.4).
pub struct EventPool {
    locals: Vec<Mutex<LocalPool>>,
    limit_in_flight: bool,
    level: Level,
    next_slot: AtomicUsize,
}

impl EventPool {
    pub fn new(capacity: usize, num_locations: usize, limit_in_flight: bool, level: Level) -> Self {
        let num_locations = num_locations.max(1);
        let per_location = capacity.div_ceil(num_locations);
        let locals = (0..num_locations)
            .map(|_| {
                Mutex::new(LocalPool {
                    capacity: per_location,
                    free: VecDeque::with_capacity(per_location),
                })
            })
            .collect();
        Self {
            locals,
            limit_in_flight,
            level,
            next_slot: AtomicUsize::new(0),
        }
    }

    pub fn num_locations(&self) -> usize {
        self.locals.len()
    }

    fn location_index(&self, location: usize) -> usize {
        location % self.locals.len()
    }

    /// Pops a free Event from `pool[location % L]`. If empty and
    /// `limit_total_events_in_flight` is set, returns `None` (the caller
    /// backs off); otherwise allocates a fresh Event, consistent with the
    /// advisory capacity bound in that mode (§9 open question (b)).
    pub fn get(&self, location: usize) -> Option<EventHandle> {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("pool mutex poisoned");
        if let Some(event) = local.free.pop_front() {
            event.set_refcount(1);
            trace!(location = idx, slot = event.slot(), "reused event from pool");
            return Some(event);
        }
        if self.limit_in_flight {
            return None;
        }
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let event = std::sync::Arc::new(Event::new(slot, idx, self.level));
        event.set_refcount(1);
        trace!(location = idx, slot, "allocated new event (past capacity)");
        Some(event)
    }

    /// Decrements the sink's in-flight hold on `event`; if that brings the
    /// reference count to zero, clears and recycles it.
    pub fn release(&self, event: EventHandle, location: usize) {
        let now_zero = event.dec_refcount() == 0;
        if now_zero {
            self.recycle(event, location);
        }
    }

    /// Recycles `event` into `pool[location % L]` assuming its reference
    /// count has already reached zero (e.g. via [`Event::release_parent`]).
    /// Returns it to the original local pool if space permits, else drops
    /// it to respect the bound.
    pub fn recycle(&self, event: EventHandle, location: usize) {
        event.clear();
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("pool mutex poisoned");
        if local.free.len() < local.capacity {
            local.free.push_back(event);
        } else {
            debug!(location = idx, "pool at capacity, dropping recycled event");
        }
    }

    /// Succeeds only when every local freelist is full (topology drained).
    pub fn scale(&self, new_capacity: usize) -> EngineResult<()> {
        for local in &self.locals {
            let guard = local.lock().expect("pool mutex poisoned");
            if guard.free.len() < guard.capacity {
                return Err(EngineError::NotDrained);
            }
        }
        let num_locations = self.locals.len();
        let per_location = new_capacity.div_ceil(num_locations);
        for local in &self.locals {
            let mut guard = local.lock().expect("pool mutex poisoned");
            guard.capacity = per_location;
            guard.free.truncate(per_location);
        }
        Ok(())
    }

    /// Total events currently idle across all locations.
    pub fn idle_count(&self) -> usize {
        self.locals
            .iter()
            .map(|l| l.lock().expect("pool mutex poisoned").free.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_and_release_round_trips_capacity() {
        let pool = EventPool::new(4, 1, true, Level::PhysicsEvent);
        let mut handles = Vec::new();
        while let Some(h) = pool.get(0) {
            handles.push(h);
        }
        assert_eq!(handles.len(), 4);
        assert_eq!(pool.get(0).map(|_| ()), None);
        for h in handles {
            pool.release(h, 0);
        }
        assert_eq!(pool.idle_count(), 4);
    }

    #[test]
    fn unlimited_mode_allocates_past_capacity() {
        let pool = EventPool::new(1, 1, false, Level::PhysicsEvent);
        let a = pool.get(0).unwrap();
        let b = pool.get(0).unwrap();
        assert_ne!(a.slot(), b.slot());
    }

    #[test]
    fn scale_fails_when_not_drained() {
        let pool = EventPool::new(2, 1, true, Level::PhysicsEvent);
        let _h = pool.get(0).unwrap();
        assert!(matches!(pool.scale(4), Err(EngineError::NotDrained)));
    }
}
