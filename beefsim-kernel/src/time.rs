//! Logical time for the simulation.
//!
//! Durations are plain [`std::time::Duration`] values. Points on the simulated
//! timeline are [`Instant`]s, measured from [`Instant::GENESIS`]. Arithmetic
//! saturates at [`Instant::END_OF_TIME`] so that "forever" stays representable.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point on the simulated timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant(Duration);

impl Instant {
    /// The first representable instant.
    pub const GENESIS: Instant = Instant(Duration::ZERO);

    /// The last representable instant. Nothing is ever scheduled after it.
    pub const END_OF_TIME: Instant = Instant(Duration::MAX);

    /// Creates an instant at `offset` after genesis.
    pub const fn from_duration(offset: Duration) -> Self {
        Instant(offset)
    }

    /// Creates an instant `secs` seconds after genesis.
    pub const fn from_secs(secs: u64) -> Self {
        Instant(Duration::from_secs(secs))
    }

    /// Creates an instant `millis` milliseconds after genesis.
    pub const fn from_millis(millis: u64) -> Self {
        Instant(Duration::from_millis(millis))
    }

    /// Creates an instant `micros` microseconds after genesis.
    pub const fn from_micros(micros: u64) -> Self {
        Instant(Duration::from_micros(micros))
    }

    /// Offset of this instant from genesis.
    pub const fn since_genesis(self) -> Duration {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Instant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// Moves the instant forward, or `None` past [`Instant::END_OF_TIME`].
    pub fn checked_add(self, duration: Duration) -> Option<Instant> {
        self.0.checked_add(duration).map(Instant)
    }

    /// Moves the instant forward, saturating at [`Instant::END_OF_TIME`].
    pub fn saturating_add(self, duration: Duration) -> Instant {
        Instant(self.0.saturating_add(duration))
    }

    /// Moves the instant backwards, saturating at [`Instant::GENESIS`].
    pub fn saturating_sub(self, duration: Duration) -> Instant {
        Instant(self.0.saturating_sub(duration))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        self.saturating_add(rhs)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        self.saturating_sub(rhs)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Instant::END_OF_TIME {
            return write!(f, "end-of-time");
        }
        write!(f, "{}.{:06}s", self.0.as_secs(), self.0.subsec_micros())
    }
}

/// A half-open span of simulated time, `[begin, end)`.
///
/// Invariant: `begin <= end`. Zero-length intervals are allowed and overlap
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    begin: Instant,
    end: Instant,
}

impl Interval {
    /// Creates `[begin, end)`. An `end` earlier than `begin` is clamped to `begin`.
    pub fn new(begin: Instant, end: Instant) -> Self {
        debug_assert!(begin <= end, "interval end {end} precedes begin {begin}");
        Self {
            begin,
            end: end.max(begin),
        }
    }

    /// Creates `[begin, begin + duration)`.
    pub fn starting_at(begin: Instant, duration: Duration) -> Self {
        Self::new(begin, begin + duration)
    }

    /// First instant of the interval.
    pub fn begin(&self) -> Instant {
        self.begin
    }

    /// First instant after the interval.
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Length of the interval.
    pub fn len(&self) -> Duration {
        self.end - self.begin
    }

    /// Returns `true` for zero-length intervals.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Returns `true` if `instant` lies within `[begin, end)`.
    pub fn contains(&self, instant: Instant) -> bool {
        self.begin <= instant && instant < self.end
    }

    /// Returns `true` if the two intervals share at least one instant.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    /// Returns `true` if `next` starts exactly where `self` ends.
    pub fn is_contiguous(&self, next: &Interval) -> bool {
        self.end == next.begin
    }

    /// The common part of both intervals, if any.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Interval::new(
            self.begin.max(other.begin),
            self.end.min(other.end),
        ))
    }

    /// `self` minus `other`: the piece before `other` and the piece after it.
    ///
    /// Either piece is `None` when it would be empty.
    pub fn difference(&self, other: &Interval) -> (Option<Interval>, Option<Interval>) {
        if !self.overlaps(other) {
            let whole = (!self.is_empty()).then_some(*self);
            return if other.begin >= self.end {
                (whole, None)
            } else {
                (None, whole)
            };
        }
        let before = (self.begin < other.begin).then(|| Interval::new(self.begin, other.begin));
        let after = (other.end < self.end).then(|| Interval::new(other.end, self.end));
        (before, after)
    }

    /// Union of two overlapping or contiguous intervals.
    pub fn merge(&self, other: &Interval) -> Option<Interval> {
        if self.overlaps(other) || self.is_contiguous(other) || other.is_contiguous(self) {
            Some(Interval::new(
                self.begin.min(other.begin),
                self.end.max(other.end),
            ))
        } else {
            None
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Sorts intervals and merges every overlapping or contiguous pair.
pub fn merge_all(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) => match last.merge(&interval) {
                Some(union) => *last = union,
                None => merged.push(interval),
            },
            None => merged.push(interval),
        }
    }
    merged
}
