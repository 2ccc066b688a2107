use std::{cmp::Ordering, collections::BinaryHeap, fmt};

use crate::time::Instant;

/// Identity of a submitted event, stable across re-queueing.
///
/// Components keep an `EventId` instead of the event itself when they may
/// need to cancel it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an [`EventSource`](crate::EventSource) registered on a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

/// An event scheduled for execution at a specific simulation time.
#[derive(Debug, Clone)]
pub struct ScheduledEvent<E> {
    time: Instant,
    submitted_for: Instant,
    sequence: u64, // For deterministic ordering
    id: EventId,
    origin: Option<SourceId>,
    event: E,
}

impl<E> ScheduledEvent<E> {
    /// Creates a new scheduled event.
    pub(crate) fn new(
        time: Instant,
        event: E,
        sequence: u64,
        id: EventId,
        origin: Option<SourceId>,
    ) -> Self {
        Self {
            time,
            submitted_for: time,
            sequence,
            id,
            origin,
            event,
        }
    }

    /// Returns the instant the event is queued for.
    pub fn time(&self) -> Instant {
        self.time
    }

    /// Returns the instant the event was originally submitted for.
    ///
    /// Differs from [`time`](Self::time) once the event has been deferred.
    pub fn submitted_for(&self) -> Instant {
        self.submitted_for
    }

    /// Returns the insertion sequence number used as a tie-break.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the event's identity.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Returns the source this event was pulled from, if any.
    pub fn origin(&self) -> Option<SourceId> {
        self.origin
    }

    /// Returns a reference to the event.
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Consumes the scheduled event and returns the event.
    pub fn into_event(self) -> E {
        self.event
    }

    /// Moves the event to a later slot, keeping its identity and origin.
    pub(crate) fn deferred(mut self, time: Instant, sequence: u64) -> Self {
        self.time = time;
        self.sequence = sequence;
        self
    }
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, but we want earliest time first
        // So we reverse the time comparison
        match other.time.cmp(&self.time) {
            Ordering::Equal => {
                // For events at the same time, use sequence number for deterministic ordering
                // Earlier sequence numbers should be processed first (also reversed for max heap)
                other.sequence.cmp(&self.sequence)
            }
            other => other,
        }
    }
}

/// A priority queue for scheduling events in chronological order.
///
/// Events are processed in time order, with deterministic ordering for events
/// scheduled at the same time using sequence numbers.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<ScheduledEvent<E>>,
}

impl<E> EventQueue<E> {
    /// Creates a new empty event queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Schedules an event for execution.
    pub fn schedule(&mut self, event: ScheduledEvent<E>) {
        self.heap.push(event);
    }

    /// Removes and returns the earliest scheduled event.
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent<E>> {
        self.heap.pop()
    }

    /// Returns a reference to the earliest scheduled event without removing it.
    pub fn peek_earliest(&self) -> Option<&ScheduledEvent<E>> {
        self.heap.peek()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of events in the queue.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Iterates over queued events in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent<E>> {
        self.heap.iter()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
