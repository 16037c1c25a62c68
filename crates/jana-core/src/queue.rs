//! Bounded, location-partitioned FIFO of Event handles between arrows.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::errors::{EngineError, EngineResult};
use crate::event::EventHandle;

struct LocalQueue {
    buf: VecDeque<EventHandle>,
    reserved: usize,
}

/// A bounded ring buffer per location with a reserve/commit protocol, so an
/// arrow can guarantee space downstream *before* popping an Event upstream
/// (§4.5). Queues never block; back-pressure is realised by the caller
/// treating a failed reservation as `ComeBackLater`.
pub struct Queue {
    locals: Vec<Mutex<LocalQueue>>,
    capacity: usize,
    threshold: usize,
    ordered: bool,
}

impl Queue {
    pub fn new(capacity: usize, threshold: usize, num_locations: usize) -> Self {
        Self::build(capacity, threshold, num_locations, false)
    }

    /// Enables monotone event-number ordering on push. Forces a single
    /// location, per the engine's "ordering" mode (§5).
    pub fn new_ordered(capacity: usize, threshold: usize) -> Self {
        Self::build(capacity, threshold, 1, true)
    }

    fn build(capacity: usize, threshold: usize, num_locations: usize, ordered: bool) -> Self {
        let num_locations = if ordered { 1 } else { num_locations.max(1) };
        let locals = (0..num_locations)
            .map(|_| {
                Mutex::new(LocalQueue {
                    buf: VecDeque::with_capacity(capacity),
                    reserved: 0,
                })
            })
            .collect();
        Self {
            locals,
            capacity,
            threshold: threshold.min(capacity),
            ordered,
        }
    }

    fn location_index(&self, location: usize) -> usize {
        location % self.locals.len()
    }

    /// Reserves space for `n` future items at `location`. Fails with
    /// `QueueFull` if the threshold would be exceeded; the reservation is
    /// released by either [`Queue::commit`] or [`Queue::unreserve`].
    pub fn reserve(&self, n: usize, location: usize) -> EngineResult<()> {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("queue mutex poisoned");
        if local.buf.len() + local.reserved + n > self.threshold {
            return Err(EngineError::QueueFull { location: idx });
        }
        local.reserved += n;
        Ok(())
    }

    /// Aborts a reservation made with [`Queue::reserve`] without pushing.
    pub fn unreserve(&self, n: usize, location: usize) {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("queue mutex poisoned");
        local.reserved = local.reserved.saturating_sub(n);
    }

    /// Commits `items` against a prior reservation of `items.len()`.
    pub fn commit(&self, items: Vec<EventHandle>, location: usize) {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("queue mutex poisoned");
        local.reserved = local.reserved.saturating_sub(items.len());
        self.insert_locked(&mut local, items);
    }

    /// Pushes `items` directly, without a prior reservation. Fails with
    /// `Full` if remaining capacity is less than `items.len()`.
    pub fn push(&self, items: Vec<EventHandle>, location: usize) -> EngineResult<()> {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("queue mutex poisoned");
        if local.buf.len() + local.reserved + items.len() > self.threshold {
            return Err(EngineError::QueueFull { location: idx });
        }
        self.insert_locked(&mut local, items);
        Ok(())
    }

    fn insert_locked(&self, local: &mut LocalQueue, items: Vec<EventHandle>) {
        if !self.ordered {
            local.buf.extend(items);
            return;
        }
        for item in items {
            let n = item.event_number();
            let pos = local
                .buf
                .iter()
                .position(|e| e.event_number() > n)
                .unwrap_or(local.buf.len());
            local.buf.insert(pos, item);
        }
    }

    /// Non-blocking pop of up to `max_n` items; returns 0 if fewer than
    /// `min_n` are currently available.
    pub fn pop(&self, min_n: usize, max_n: usize, location: usize) -> Vec<EventHandle> {
        let idx = self.location_index(location);
        let mut local = self.locals[idx].lock().expect("queue mutex poisoned");
        if local.buf.len() < min_n {
            return Vec::new();
        }
        let n = max_n.min(local.buf.len());
        local.buf.drain(..n).collect()
    }

    pub fn len(&self, location: usize) -> usize {
        let idx = self.location_index(location);
        self.locals[idx].lock().expect("queue mutex poisoned").buf.len()
    }

    pub fn is_empty(&self, location: usize) -> bool {
        self.len(location) == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn num_locations(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::identity::Level;
    use std::sync::Arc;

    fn handle(slot: usize, event_number: u64) -> EventHandle {
        let e = Arc::new(Event::new(slot, 0, Level::PhysicsEvent));
        e.set_event_number(event_number);
        e
    }

    #[test]
    fn push_fails_past_threshold() {
        let q = Queue::new(4, 2, 1);
        q.push(vec![handle(0, 0)], 0).unwrap();
        q.push(vec![handle(1, 1)], 0).unwrap();
        assert!(matches!(q.push(vec![handle(2, 2)], 0), Err(EngineError::QueueFull { .. })));
    }

    #[test]
    fn reserve_then_commit_round_trips() {
        let q = Queue::new(4, 4, 1);
        q.reserve(2, 0).unwrap();
        assert!(matches!(q.push(vec![handle(0, 0), handle(1, 1), handle(2, 2)], 0), Err(_)));
        q.commit(vec![handle(3, 3), handle(4, 4)], 0);
        assert_eq!(q.len(0), 2);
    }

    #[test]
    fn ordered_queue_pops_in_event_number_order() {
        let q = Queue::new_ordered(4, 4);
        q.push(vec![handle(0, 5)], 0).unwrap();
        q.push(vec![handle(1, 2)], 0).unwrap();
        q.push(vec![handle(2, 9)], 0).unwrap();
        let popped = q.pop(0, 3, 0);
        let numbers: Vec<u64> = popped.iter().map(|e| e.event_number()).collect();
        assert_eq!(numbers, vec![2, 5, 9]);
    }
}
