//! # telluride-sim: deterministic discrete-event kernel
//!
//! This crate provides the simulation kernel the Telluride network layer
//! runs on:
//!
//! - **[`SimClock`]**: discrete simulated time (picosecond precision)
//! - **[`EventQueue`]**: priority queue ordered by `(time, priority,
//!   insertion order)` with tombstone cancellation
//! - **[`Timeline`]**: clock + queue with a soft stop time
//! - **[`SimRng`]**: deterministic, forkable random number generator
//!
//! The kernel is single-threaded and cooperative: all work happens inside
//! event handlers that run to completion, and apparent concurrency is
//! resolved entirely by the dequeue order. Same seed, same event sequence,
//! same run.
//!
//! ## Quick start
//!
//! ```
//! use telluride_sim::Timeline;
//!
//! let mut timeline: Timeline<&str> = Timeline::new();
//! timeline.schedule_at(1_000, 0, "hello");
//! timeline.schedule_at(500, 0, "world");
//!
//! let first = timeline.next().unwrap();
//! assert_eq!(first.kind, "world");
//! assert_eq!(timeline.now(), 500);
//! ```

mod clock;
mod event;
mod rng;

pub use clock::{SimClock, Time, ms_to_ps, ns_to_ps, ps_to_sec, sec_to_ps, us_to_ps};
pub use event::{Event, EventId, EventQueue};
pub use rng::SimRng;

/// Clock and event queue coupled behind one scheduling surface.
///
/// The stop time is *soft*: events past it stay queued, the clock halts at
/// the last event actually dispatched, and a later call to [`Timeline::next`]
/// after raising (or clearing) the stop time resumes where the run left
/// off. Driver code uses this to advance the simulation in stages.
pub struct Timeline<K> {
    clock: SimClock,
    queue: EventQueue<K>,
    stop_time: Option<Time>,
    events_processed: u64,
}

impl<K> Timeline<K> {
    /// Creates an empty timeline at time zero with no stop time.
    pub fn new() -> Self {
        Self {
            clock: SimClock::new(),
            queue: EventQueue::new(),
            stop_time: None,
            events_processed: 0,
        }
    }

    /// Returns the current simulation time.
    #[inline]
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Sets or clears the soft stop time.
    pub fn set_stop_time(&mut self, stop_time: Option<Time>) {
        self.stop_time = stop_time;
    }

    /// Returns the configured stop time, if any.
    pub fn stop_time(&self) -> Option<Time> {
        self.stop_time
    }

    /// Schedules an event at an absolute time.
    ///
    /// # Panics
    ///
    /// Panics if `time` is in the past. Scheduling backward in time is an
    /// unrecoverable programmer error.
    pub fn schedule_at(&mut self, time: Time, priority: u8, kind: K) -> EventId {
        assert!(
            time >= self.clock.now(),
            "event scheduled in the past: {time} < {}",
            self.clock.now()
        );
        self.queue.schedule(time, priority, kind)
    }

    /// Schedules an event after a delay from the current time.
    pub fn schedule_in(&mut self, delay: Time, priority: u8, kind: K) -> EventId {
        let time = self.clock.now().checked_add(delay).expect("time overflow");
        self.queue.schedule(time, priority, kind)
    }

    /// Cancels a pending event. Returns `true` if it had not yet fired.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    /// Number of live pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Removes the next event and advances the clock to its timestamp.
    ///
    /// Returns `None` when the queue is drained or the next event lies at
    /// or beyond the stop time (the event stays queued in that case).
    pub fn next(&mut self) -> Option<Event<K>> {
        let time = self.queue.peek_time()?;
        if let Some(stop) = self.stop_time {
            if time >= stop {
                return None;
            }
        }
        let event = self.queue.pop()?;
        self.clock.advance_to(event.time);
        self.events_processed += 1;
        Some(event)
    }

    /// Total number of events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }
}

impl<K> Default for Timeline<K> {
    fn default() -> Self {
        Self::new()
    }
}
