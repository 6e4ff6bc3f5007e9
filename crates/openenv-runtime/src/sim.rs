//! Minimal discrete-event queue
//!
//! The controller only needs [`EventScheduler`]; [`Simulator`] is the
//! single-threaded implementation used by [`Session`](crate::Session) and tests.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Simulated time in nanoseconds
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs * 1_000_000_000)
    }

    /// Negative and NaN inputs map to zero
    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime((secs * 1e9).round().max(0.0) as u64)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl From<Duration> for SimTime {
    fn from(d: Duration) -> Self {
        SimTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:.3}s", self.as_secs_f64())
    }
}

/// Handle of a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

/// Scheduling interface the step controller consumes from the simulator
pub trait EventScheduler {
    type Event;

    /// Current simulated time
    fn now(&self) -> SimTime;

    /// Schedule `event` to fire at `now + delay`
    fn schedule(&mut self, delay: SimTime, event: Self::Event) -> EventId;

    /// Cancel a pending event; false if it already fired or was cancelled
    fn cancel(&mut self, id: EventId) -> bool;
}

struct Scheduled<E> {
    at: SimTime,
    id: EventId,
    event: E,
}

// Ordered by (time, insertion order); the payload does not participate.
impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.id).cmp(&(other.at, other.id))
    }
}

/// Single-threaded event queue; events with equal times fire in scheduling order
pub struct Simulator<E> {
    now: SimTime,
    queue: BinaryHeap<Reverse<Scheduled<E>>>,
    live: HashSet<EventId>,
    next_id: u64,
    processed: u64,
}

impl<E> Default for Simulator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Simulator<E> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
            processed: 0,
        }
    }

    /// Drop cancelled entries sitting at the head of the queue
    fn purge(&mut self) {
        while let Some(Reverse(head)) = self.queue.peek() {
            if self.live.contains(&head.id) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Time of the next live event
    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.purge();
        self.queue.peek().map(|Reverse(s)| s.at)
    }

    /// Pop the next live event and advance the clock to it
    pub fn pop_next(&mut self) -> Option<(EventId, E)> {
        self.purge();
        let Reverse(next) = self.queue.pop()?;
        self.live.remove(&next.id);
        self.now = next.at;
        self.processed += 1;
        Some((next.id, next.event))
    }

    /// Pop the next live event if it fires no later than `limit`
    pub fn pop_until(&mut self, limit: SimTime) -> Option<(EventId, E)> {
        match self.peek_time() {
            Some(at) if at <= limit => self.pop_next(),
            _ => None,
        }
    }

    /// Number of live events
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn is_idle(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of events popped so far
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

impl<E> EventScheduler for Simulator<E> {
    type Event = E;

    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, delay: SimTime, event: E) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.queue.push(Reverse(Scheduled {
            at: self.now + delay,
            id,
            event,
        }));
        id
    }

    fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_fire_in_time_order() {
        let mut sim = Simulator::new();
        sim.schedule(SimTime::from_millis(300), "c");
        sim.schedule(SimTime::from_millis(100), "a");
        sim.schedule(SimTime::from_millis(200), "b");

        let mut fired = Vec::new();
        while let Some((_, ev)) = sim.pop_next() {
            fired.push((sim.now(), ev));
        }
        assert_eq!(
            fired,
            vec![
                (SimTime::from_millis(100), "a"),
                (SimTime::from_millis(200), "b"),
                (SimTime::from_millis(300), "c"),
            ]
        );
        assert_eq!(sim.processed(), 3);
    }

    #[test]
    fn test_ties_are_fifo() {
        let mut sim = Simulator::new();
        for i in 0..5 {
            sim.schedule(SimTime::ZERO, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| sim.pop_next().map(|(_, e)| e)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_schedule_is_relative_to_now() {
        let mut sim = Simulator::new();
        sim.schedule(SimTime::from_secs(1), 1);
        sim.pop_next();
        sim.schedule(SimTime::from_millis(500), 2);
        assert_eq!(sim.peek_time(), Some(SimTime::from_millis(1500)));
    }

    #[test]
    fn test_cancel() {
        let mut sim = Simulator::new();
        let a = sim.schedule(SimTime::from_millis(1), 'a');
        sim.schedule(SimTime::from_millis(2), 'b');
        assert_eq!(sim.pending(), 2);
        assert!(sim.cancel(a));
        assert!(!sim.cancel(a));
        assert_eq!(sim.pending(), 1);
        assert_eq!(sim.peek_time(), Some(SimTime::from_millis(2)));
        assert_eq!(sim.pop_next().map(|(_, e)| e), Some('b'));
        assert!(sim.pop_next().is_none());
        assert!(sim.is_idle());
    }

    #[test]
    fn test_pop_until_stops_at_limit() {
        let mut sim = Simulator::new();
        sim.schedule(SimTime::from_millis(100), 1);
        sim.schedule(SimTime::from_millis(200), 2);
        let limit = SimTime::from_millis(150);
        assert_eq!(sim.pop_until(limit).map(|(_, e)| e), Some(1));
        assert!(sim.pop_until(limit).is_none());
        assert_eq!(sim.now(), SimTime::from_millis(100));
        assert_eq!(sim.pending(), 1);
    }

    #[test]
    fn test_sim_time_conversions() {
        assert_eq!(SimTime::from_secs_f64(0.1), SimTime::from_millis(100));
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
        assert_eq!(SimTime::from(Duration::from_millis(250)).as_secs_f64(), 0.25);
        assert_eq!(SimTime::from_millis(1500).to_string(), "+1.500s");
    }
}
