//! Core simulation world and coordination logic.
//!
//! This module provides the central [`SimWorld`] coordinator that owns the
//! logical clock and the time-ordered event queue, and the [`WeakSimWorld`]
//! handle that simulated components keep to schedule their own follow-up work.

use std::{
    cell::RefCell,
    collections::HashSet,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};
use tracing::instrument;

use crate::{
    SimulationError, SimulationResult,
    events::{EventId, EventQueue, ScheduledEvent, SourceId},
    time::Instant,
};

/// A lazily-pulled, time-ordered stream of events.
///
/// The world keeps at most one event per source in its queue and pulls the
/// next one only when the previous one has been dequeued.
pub trait EventSource<E> {
    /// Produces the next event and the instant it was recorded for.
    ///
    /// Instants must be non-decreasing. `Ok(None)` ends the source.
    fn next_event(&mut self) -> SimulationResult<Option<(Instant, E)>>;
}

/// Receives the events dispatched by [`SimWorld::step`].
pub trait EventHandler<E> {
    /// Error type returned by the handler. Kernel errors convert into it.
    type Error: From<SimulationError>;

    /// Earliest instant at which `event` may actually run.
    ///
    /// An event whose due time is later than its queue slot is re-queued at
    /// its due time instead of being dispatched.
    fn due_time(&self, _event: &E, submitted_for: Instant) -> Instant {
        submitted_for
    }

    /// Processes `event` with the clock set to `now`.
    fn handle(&mut self, now: Instant, event: E) -> Result<(), Self::Error>;
}

/// Internal simulation state holder
pub(crate) struct SimInner<E> {
    pub(crate) start: Instant,
    pub(crate) end: Instant,
    pub(crate) current_time: Instant,
    pub(crate) event_queue: EventQueue<E>,
    pub(crate) next_sequence: u64,
    pub(crate) next_id: u64,

    // Ids still sitting in the queue, and the subset of them that was cancelled
    pub(crate) queued: HashSet<EventId>,
    pub(crate) cancelled: HashSet<EventId>,

    pub(crate) sources: Vec<Option<Box<dyn EventSource<E>>>>,

    // Event processing metrics
    pub(crate) events_processed: u64,
}

impl<E> SimInner<E> {
    fn new(start: Instant, end: Instant) -> Self {
        Self {
            start,
            end,
            current_time: start,
            event_queue: EventQueue::new(),
            next_sequence: 0,
            next_id: 0,
            queued: HashSet::new(),
            cancelled: HashSet::new(),
            sources: Vec::new(),
            events_processed: 0,
        }
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn enqueue(
        &mut self,
        submitted_for: Instant,
        due: Instant,
        event: E,
        origin: Option<SourceId>,
    ) -> SimulationResult<EventId> {
        if due < self.current_time {
            return Err(SimulationError::ScheduledInPast {
                requested: due,
                now: self.current_time,
            });
        }
        let id = EventId(self.next_id);
        self.next_id += 1;
        let sequence = self.take_sequence();

        let mut scheduled = ScheduledEvent::new(submitted_for, event, sequence, id, origin);
        if due > submitted_for {
            scheduled = scheduled.deferred(due, sequence);
        }
        self.event_queue.schedule(scheduled);
        self.queued.insert(id);
        Ok(id)
    }
}

impl<E> fmt::Debug for SimInner<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInner")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("current_time", &self.current_time)
            .field("queued", &self.queued.len())
            .field("cancelled", &self.cancelled.len())
            .field("sources", &self.sources.len())
            .field("events_processed", &self.events_processed)
            .finish_non_exhaustive()
    }
}

/// The central simulation coordinator that manages time and event processing.
///
/// `SimWorld` owns the clock and the queue. Simulated components hold a
/// [`WeakSimWorld`] and schedule through it while a handler is running;
/// the world never keeps its internal borrow across a handler call.
#[derive(Debug)]
pub struct SimWorld<E> {
    pub(crate) inner: Rc<RefCell<SimInner<E>>>,
}

impl<E> SimWorld<E> {
    /// Creates a world whose clock starts at genesis and never stops.
    pub fn new() -> Self {
        Self::with_bounds(Instant::GENESIS, Instant::END_OF_TIME)
    }

    /// Creates a world whose clock starts at `start` and stops past `end`.
    pub fn with_bounds(start: Instant, end: Instant) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SimInner::new(start, end))),
        }
    }

    /// Returns the current simulation time.
    ///
    /// Before the first dispatch this is the configured start instant.
    pub fn now(&self) -> Instant {
        self.inner.borrow().current_time
    }

    /// Returns the configured start instant.
    pub fn start(&self) -> Instant {
        self.inner.borrow().start
    }

    /// Returns the configured end-of-simulation instant.
    pub fn end(&self) -> Instant {
        self.inner.borrow().end
    }

    /// Schedules an event at the specified absolute time.
    ///
    /// Fails with [`SimulationError::ScheduledInPast`] if `time` is earlier
    /// than the current clock. An event scheduled for the current instant
    /// runs after every event already queued for that instant.
    #[instrument(skip(self, event))]
    pub fn schedule_at(&self, time: Instant, event: E) -> SimulationResult<EventId> {
        self.inner.borrow_mut().enqueue(time, time, event, None)
    }

    /// Schedules an event to execute after the specified delay from the current time.
    pub fn schedule_after(&self, delay: Duration, event: E) -> SimulationResult<EventId> {
        let time = self.now() + delay;
        self.schedule_at(time, event)
    }

    /// Cancels a pending event.
    ///
    /// Returns `true` if the event was still pending. Cancelling an event that
    /// already ran, or was already cancelled, is a no-op.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.queued.contains(&id) {
            inner.cancelled.insert(id)
        } else {
            false
        }
    }

    /// Returns `true` if the event is queued and not cancelled.
    pub fn is_pending(&self, id: EventId) -> bool {
        let inner = self.inner.borrow();
        inner.queued.contains(&id) && !inner.cancelled.contains(&id)
    }

    /// Registers a source and queues its first event.
    pub fn add_source<S>(&self, source: S) -> SimulationResult<SourceId>
    where
        S: EventSource<E> + 'static,
    {
        let mut source: Box<dyn EventSource<E>> = Box::new(source);
        let first = source.next_event()?;

        let mut inner = self.inner.borrow_mut();
        let id = SourceId(inner.sources.len());
        inner.sources.push(Some(source));
        if let Some((at, event)) = first {
            inner.enqueue(at, at, event, Some(id))?;
        }
        Ok(id)
    }

    /// Processes the next live event and advances time.
    ///
    /// Cancelled events are skipped without reaching the handler. An event
    /// whose due time moved past its slot is re-queued instead of dispatched.
    /// Returns `true` if more events are available for processing, `false`
    /// once the queue is drained or the next event lies past the end instant.
    #[instrument(skip(self, handler))]
    pub fn step<H>(&self, handler: &mut H) -> Result<bool, H::Error>
    where
        H: EventHandler<E>,
    {
        loop {
            let popped = self.inner.borrow_mut().event_queue.pop_earliest();
            let Some(scheduled) = popped else {
                return Ok(false);
            };
            let id = scheduled.id();

            let was_cancelled = {
                let mut inner = self.inner.borrow_mut();
                if inner.cancelled.remove(&id) {
                    inner.queued.remove(&id);
                    true
                } else {
                    false
                }
            };
            if was_cancelled {
                tracing::trace!(%id, "skipping cancelled event");
                if let Some(origin) = scheduled.origin() {
                    self.pull_next(origin, handler)?;
                }
                continue;
            }

            {
                let mut inner = self.inner.borrow_mut();
                if scheduled.time() > inner.end {
                    tracing::debug!(end = %inner.end, "next event lies past the end of the simulation");
                    inner.event_queue.schedule(scheduled);
                    return Ok(false);
                }
                if scheduled.time() < inner.current_time {
                    return Err(SimulationError::InvalidState(format!(
                        "event {id} queued for {} but the clock is already at {}",
                        scheduled.time(),
                        inner.current_time
                    ))
                    .into());
                }
            }

            let due = handler.due_time(scheduled.event(), scheduled.submitted_for());
            if due > scheduled.time() {
                let mut inner = self.inner.borrow_mut();
                let sequence = inner.take_sequence();
                tracing::trace!(%id, from = %scheduled.time(), to = %due, "deferring event");
                inner.event_queue.schedule(scheduled.deferred(due, sequence));
                continue;
            }

            let now = scheduled.time();
            {
                let mut inner = self.inner.borrow_mut();
                inner.queued.remove(&id);
                inner.current_time = now;
                inner.events_processed += 1;
            }

            if let Some(origin) = scheduled.origin() {
                self.pull_next(origin, handler)?;
            }

            handler.handle(now, scheduled.into_event())?;
            return Ok(self.has_pending_events());
        }
    }

    /// Processes events until the queue is empty or the end instant is reached.
    #[instrument(skip(self, handler))]
    pub fn run<H>(&self, handler: &mut H) -> Result<(), H::Error>
    where
        H: EventHandler<E>,
    {
        while self.step(handler)? {}
        tracing::debug!(
            now = %self.now(),
            processed = self.events_processed(),
            "simulation loop finished"
        );
        Ok(())
    }

    fn pull_next<H>(&self, origin: SourceId, handler: &H) -> Result<(), H::Error>
    where
        H: EventHandler<E>,
    {
        let taken = self
            .inner
            .borrow_mut()
            .sources
            .get_mut(origin.0)
            .and_then(Option::take);
        let Some(mut source) = taken else {
            return Ok(());
        };

        let next = source.next_event();
        if let Some(slot) = self.inner.borrow_mut().sources.get_mut(origin.0) {
            *slot = Some(source);
        }

        if let Some((at, event)) = next? {
            let due = handler.due_time(&event, at);
            self.inner
                .borrow_mut()
                .enqueue(at, due, event, Some(origin))?;
        }
        Ok(())
    }

    /// Returns `true` if there are live events waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        self.pending_event_count() > 0
    }

    /// Returns the number of live events waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.queued.len() - inner.cancelled.len()
    }

    /// Returns the number of events dispatched to a handler so far.
    pub fn events_processed(&self) -> u64 {
        self.inner.borrow().events_processed
    }

    /// Creates a weak reference to this simulation world.
    ///
    /// Weak references can be used to access the simulation without preventing
    /// it from being dropped, enabling handle-based access patterns.
    pub fn downgrade(&self) -> WeakSimWorld<E> {
        WeakSimWorld {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<E: Clone> SimWorld<E> {
    /// Snapshot of the live queue in dispatch order, with each event's slot.
    pub fn pending_events(&self) -> Vec<(Instant, E)> {
        let inner = self.inner.borrow();
        let mut live: Vec<&ScheduledEvent<E>> = inner
            .event_queue
            .iter()
            .filter(|scheduled| !inner.cancelled.contains(&scheduled.id()))
            .collect();
        live.sort_by(|a, b| b.cmp(a));
        live.into_iter()
            .map(|scheduled| (scheduled.time(), scheduled.event().clone()))
            .collect()
    }
}

impl<E> Default for SimWorld<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A weak reference to a simulation world.
///
/// Held by simulated components so that they can schedule follow-up events
/// without keeping the world alive.
pub struct WeakSimWorld<E> {
    pub(crate) inner: Weak<RefCell<SimInner<E>>>,
}

/// Macro to generate WeakSimWorld forwarding methods that wrap SimWorld results.
macro_rules! weak_forward {
    // For methods returning T that need Ok() wrapping
    (wrap $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            Ok(self.upgrade()?.$method($($arg),*))
        }
    };
    // For methods already returning SimulationResult
    (pass $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            self.upgrade()?.$method($($arg),*)
        }
    };
}

impl<E> WeakSimWorld<E> {
    /// Attempts to upgrade this weak reference to a strong reference.
    pub fn upgrade(&self) -> SimulationResult<SimWorld<E>> {
        self.inner
            .upgrade()
            .map(|inner| SimWorld { inner })
            .ok_or(SimulationError::SimulationShutdown)
    }

    weak_forward!(wrap #[doc = "Returns the current simulation time."] now(&self) -> Instant);
    weak_forward!(pass #[doc = "Schedules an event at the specified absolute time."] schedule_at(&self, time: Instant, event: E) -> EventId);
    weak_forward!(pass #[doc = "Schedules an event after the specified delay."] schedule_after(&self, delay: Duration, event: E) -> EventId);
    weak_forward!(wrap #[doc = "Cancels a pending event."] cancel(&self, id: EventId) -> bool);
    weak_forward!(wrap #[doc = "Returns `true` if the event is queued and not cancelled."] is_pending(&self, id: EventId) -> bool);
    weak_forward!(wrap #[doc = "Returns `true` if there are live events waiting to be processed."] has_pending_events(&self) -> bool);
}

impl<E> Clone for WeakSimWorld<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for WeakSimWorld<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSimWorld")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every dispatch and optionally schedules follow-ups through a weak handle.
    struct Recorder {
        world: WeakSimWorld<u32>,
        seen: Vec<(Instant, u32)>,
        chain_at_same_instant: Option<u32>,
    }

    impl EventHandler<u32> for Recorder {
        type Error = SimulationError;

        fn handle(&mut self, now: Instant, event: u32) -> SimulationResult<()> {
            self.seen.push((now, event));
            if self.chain_at_same_instant == Some(event) {
                self.world.schedule_at(now, event * 10)?;
            }
            Ok(())
        }
    }

    fn recorder(world: &SimWorld<u32>) -> Recorder {
        Recorder {
            world: world.downgrade(),
            seen: Vec::new(),
            chain_at_same_instant: None,
        }
    }

    #[test]
    fn now_before_first_dispatch_is_start() {
        let world: SimWorld<u32> =
            SimWorld::with_bounds(Instant::from_secs(42), Instant::END_OF_TIME);
        assert_eq!(world.now(), Instant::from_secs(42));
    }

    #[test]
    fn scheduling_in_the_past_fails() {
        let world: SimWorld<u32> =
            SimWorld::with_bounds(Instant::from_secs(10), Instant::END_OF_TIME);
        let result = world.schedule_at(Instant::from_secs(9), 1);
        assert_eq!(
            result,
            Err(SimulationError::ScheduledInPast {
                requested: Instant::from_secs(9),
                now: Instant::from_secs(10),
            })
        );
        assert!(world.schedule_at(Instant::from_secs(10), 1).is_ok());
    }

    #[test]
    fn same_instant_follow_up_runs_after_current_batch() {
        let world = SimWorld::new();
        let mut handler = recorder(&world);
        handler.chain_at_same_instant = Some(1);

        let t = Instant::from_millis(100);
        world.schedule_at(t, 1).unwrap();
        world.schedule_at(t, 2).unwrap();
        world.run(&mut handler).unwrap();

        assert_eq!(handler.seen, vec![(t, 1), (t, 2), (t, 10)]);
    }

    #[test]
    fn cancelled_event_is_skipped() {
        let world = SimWorld::new();
        let mut handler = recorder(&world);

        let doomed = world.schedule_at(Instant::from_secs(1), 1).unwrap();
        world.schedule_at(Instant::from_secs(2), 2).unwrap();
        assert!(world.cancel(doomed));
        assert!(!world.cancel(doomed));
        assert_eq!(world.pending_event_count(), 1);

        world.run(&mut handler).unwrap();
        assert_eq!(handler.seen, vec![(Instant::from_secs(2), 2)]);
        assert_eq!(world.events_processed(), 1);
    }

    #[test]
    fn cancelling_a_dispatched_event_is_a_noop() {
        let world = SimWorld::new();
        let mut handler = recorder(&world);

        let id = world.schedule_at(Instant::from_secs(1), 1).unwrap();
        world.run(&mut handler).unwrap();
        assert!(!world.cancel(id));
        assert!(!world.is_pending(id));
    }

    #[test]
    fn stops_past_end_instant() {
        let world = SimWorld::with_bounds(Instant::GENESIS, Instant::from_secs(5));
        let mut handler = recorder(&world);

        world.schedule_at(Instant::from_secs(5), 1).unwrap();
        world.schedule_at(Instant::from_secs(6), 2).unwrap();
        world.run(&mut handler).unwrap();

        assert_eq!(handler.seen, vec![(Instant::from_secs(5), 1)]);
        assert_eq!(world.now(), Instant::from_secs(5));
        assert_eq!(world.pending_event_count(), 1);
    }

    #[test]
    fn weak_handle_fails_after_shutdown() {
        let world: SimWorld<u32> = SimWorld::new();
        let weak = world.downgrade();
        drop(world);
        assert_eq!(weak.now(), Err(SimulationError::SimulationShutdown));
    }

    struct Countdown {
        next: u64,
    }

    impl EventSource<u32> for Countdown {
        fn next_event(&mut self) -> SimulationResult<Option<(Instant, u32)>> {
            if self.next == 0 {
                return Ok(None);
            }
            self.next -= 1;
            Ok(Some((Instant::from_secs(10 - self.next), self.next as u32)))
        }
    }

    #[test]
    fn sources_are_pulled_lazily() {
        let world = SimWorld::new();
        let mut handler = recorder(&world);
        world.add_source(Countdown { next: 3 }).unwrap();

        assert_eq!(world.pending_event_count(), 1);
        world.run(&mut handler).unwrap();

        assert_eq!(
            handler.seen,
            vec![
                (Instant::from_secs(8), 2),
                (Instant::from_secs(9), 1),
                (Instant::from_secs(10), 0),
            ]
        );
    }

    /// Defers even events by a fixed amount, as a machine delay would.
    struct Lagging {
        lag: Duration,
        seen: Vec<(Instant, u32)>,
    }

    impl EventHandler<u32> for Lagging {
        type Error = SimulationError;

        fn due_time(&self, event: &u32, submitted_for: Instant) -> Instant {
            if event % 2 == 0 {
                submitted_for + self.lag
            } else {
                submitted_for
            }
        }

        fn handle(&mut self, now: Instant, event: u32) -> SimulationResult<()> {
            self.seen.push((now, event));
            Ok(())
        }
    }

    #[test]
    fn deferred_events_run_at_their_due_time() {
        let world = SimWorld::new();
        let mut handler = Lagging {
            lag: Duration::from_secs(5),
            seen: Vec::new(),
        };
        world.schedule_at(Instant::from_secs(1), 2).unwrap();
        world.schedule_at(Instant::from_secs(3), 3).unwrap();
        world.run(&mut handler).unwrap();

        assert_eq!(
            handler.seen,
            vec![(Instant::from_secs(3), 3), (Instant::from_secs(6), 2)]
        );
    }
}
