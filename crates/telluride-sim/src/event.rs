//! Event queue ordered by `(time, priority, insertion order)`.
//!
//! Events at equal timestamps dequeue in ascending priority (lower number
//! first); ties beyond that fall back to insertion order, which keeps the
//! queue FIFO-stable and the whole simulation deterministic.
//!
//! Cancellation uses a tombstone model: a cancelled event stays in the heap
//! and is skipped when it reaches the front. Nothing is ever removed from
//! the middle of the heap.

use std::collections::{BinaryHeap, HashSet};

use crate::clock::Time;

/// Handle to a scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Returns the raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A dequeued event.
#[derive(Debug)]
pub struct Event<K> {
    /// Handle assigned at scheduling time.
    pub id: EventId,
    /// Simulation time at which the event fires.
    pub time: Time,
    /// Dispatch priority at equal timestamps; lower fires earlier.
    pub priority: u8,
    /// Payload.
    pub kind: K,
}

struct Entry<K> {
    time: Time,
    priority: u8,
    seq: u64,
    id: EventId,
    kind: K,
}

impl<K> Entry<K> {
    fn key(&self) -> (Time, u8, u64) {
        (self.time, self.priority, self.seq)
    }
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so the std max-heap pops the smallest key first.
        other.key().cmp(&self.key())
    }
}

/// Priority queue of scheduled events.
///
/// Generic over the payload kind so the kernel stays free of domain types.
pub struct EventQueue<K> {
    heap: BinaryHeap<Entry<K>>,
    next_seq: u64,
    next_id: u64,
    pending: HashSet<u64>,
    cancelled: HashSet<u64>,
}

impl<K> EventQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            next_id: 0,
            pending: HashSet::new(),
            cancelled: HashSet::new(),
        }
    }

    /// Schedules an event and returns its handle.
    pub fn schedule(&mut self, time: Time, priority: u8, kind: K) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(id.0);
        self.heap.push(Entry {
            time,
            priority,
            seq,
            id,
            kind,
        });
        id
    }

    /// Marks an event cancelled.
    ///
    /// Returns `true` if the event was still pending. The entry stays in the
    /// heap and is discarded when popped.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.pending.remove(&id.0) {
            self.cancelled.insert(id.0);
            true
        } else {
            false
        }
    }

    /// Returns the timestamp of the next live event without removing it.
    pub fn peek_time(&mut self) -> Option<Time> {
        loop {
            let front = self.heap.peek()?;
            if self.cancelled.contains(&front.id.0) {
                let dead = self.heap.pop().expect("peeked entry exists");
                self.cancelled.remove(&dead.id.0);
                continue;
            }
            return Some(front.time);
        }
    }

    /// Removes and returns the next live event.
    pub fn pop(&mut self) -> Option<Event<K>> {
        loop {
            let entry = self.heap.pop()?;
            if self.cancelled.remove(&entry.id.0) {
                continue;
            }
            self.pending.remove(&entry.id.0);
            return Some(Event {
                id: entry.id,
                time: entry.time,
                priority: entry.priority,
                kind: entry.kind,
            });
        }
    }

    /// Number of live (not cancelled) scheduled events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<K> Default for EventQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
