use thiserror::Error;

use crate::time::Instant;

/// Errors that can occur during simulation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// The simulation has been shut down and is no longer accessible.
    #[error("Simulation has been shut down")]
    SimulationShutdown,
    /// An event was submitted for an instant the clock has already passed.
    #[error("cannot schedule an event at {requested}: the clock is already at {now}")]
    ScheduledInPast {
        /// Instant the event was submitted for.
        requested: Instant,
        /// Clock value at submission time.
        now: Instant,
    },
    /// An event source could not produce its next event.
    #[error("event source failed: {0}")]
    Source(String),
    /// The simulation is in an invalid state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;
