//! # beefsim kernel
//!
//! A single-threaded discrete-event engine with a logical clock.
//!
//! - Logical time ([`Instant`], [`Interval`]) that only moves when an event is dispatched
//! - A time-ordered queue with insertion-order tie-breaking and cancellation
//! - Lazily-pulled [`EventSource`]s holding at most one pending event each
//! - Handle pattern ([`WeakSimWorld`]) so components can schedule from inside handlers
//!
//! ## Example Usage
//!
//! ```rust
//! use beefsim_kernel::{EventHandler, Instant, SimWorld, SimulationError};
//!
//! struct Count(u32);
//!
//! impl EventHandler<&'static str> for Count {
//!     type Error = SimulationError;
//!
//!     fn handle(&mut self, _now: Instant, _event: &'static str) -> Result<(), SimulationError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let world = SimWorld::new();
//! world.schedule_at(Instant::from_millis(100), "wake").unwrap();
//!
//! let mut handler = Count(0);
//! world.run(&mut handler).unwrap();
//!
//! assert_eq!(handler.0, 1);
//! assert_eq!(world.now(), Instant::from_millis(100));
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Error types and utilities for simulation operations.
pub mod error;
/// Event scheduling primitives.
pub mod events;
/// Thread-local random number generation for simulation.
pub mod rng;
/// Logical instants and half-open intervals.
pub mod time;
/// Core simulation world and coordination logic.
pub mod world;

pub use error::{SimulationError, SimulationResult};
pub use events::{EventId, EventQueue, ScheduledEvent, SourceId};
pub use rng::{reset_sim_rng, set_sim_seed, sim_shuffle};
pub use time::{Instant, Interval, merge_all};
pub use world::{EventHandler, EventSource, SimWorld, WeakSimWorld};
