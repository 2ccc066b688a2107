use std::path::PathBuf;

use beefsim_kernel::{Instant, Interval, SimulationError};
use thiserror::Error;

use crate::machine::{HostId, PowerState};

/// Illegal power-state transitions. Every variant aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// The requested transition is not allowed from the current state.
    #[error("{host}: cannot {requested} while {state}, {expected}")]
    UnexpectedTransition {
        /// Machine name.
        host: String,
        /// State the machine was in.
        state: PowerState,
        /// The rejected transition.
        requested: &'static str,
        /// What the machine was waiting for instead.
        expected: &'static str,
    },
    /// The next interval does not start where the last logged one ends.
    #[error("{host}: next interval {next} is not contiguous to the current interval {last} (delay {delay:?})")]
    Discontinuity {
        /// Machine name.
        host: String,
        /// Most recently logged interval.
        last: Interval,
        /// Rejected interval.
        next: Interval,
        /// Accumulated delay at the time of the request.
        delay: std::time::Duration,
    },
    /// Wake-on-LAN arrived after the machine should already have woken up.
    #[error("{host}: wake-on-lan at {now} but the sleep period already ended at {scheduled_end}")]
    AlreadyAwake {
        /// Machine name.
        host: String,
        /// End of the logged sleep period.
        scheduled_end: Instant,
        /// Instant of the wake-on-LAN.
        now: Instant,
    },
    /// A second activity arrived during the same wake-up transition.
    #[error("{host}: activity requested at {requested} again during wake-up transition {transition}")]
    EarlyActivity {
        /// Machine name.
        host: String,
        /// The wake-up transition interval.
        transition: Interval,
        /// Requested activity begin.
        requested: Instant,
    },
    /// The machine could not schedule its follow-up event.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Errors from replica bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    /// A replica was released twice.
    #[error("replica on {server} already deleted")]
    AlreadyDeleted {
        /// Server holding the replica.
        server: HostId,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Unknown data placement name.
    #[error("unknown data placement '{0}' (expected random or co-random)")]
    UnknownPlacement(String),
    /// Unknown replicator name.
    #[error("unknown replicator '{0}' (expected faithful, kind, noop or never-migrate)")]
    UnknownReplicator(String),
    /// A value is out of range or inconsistent with another.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by trace readers.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace file could not be opened or read.
    #[error("failed to read trace {path}: {source}")]
    Io {
        /// Trace file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A line does not follow the trace format.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        /// Trace file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<TraceError> for SimulationError {
    fn from(err: TraceError) -> Self {
        SimulationError::Source(err.to_string())
    }
}

/// Top-level error for building and running a simulation.
#[derive(Debug, Error)]
pub enum BeefsError {
    /// Illegal machine transition.
    #[error(transparent)]
    Machine(#[from] MachineError),
    /// Replica bookkeeping violation.
    #[error(transparent)]
    Replica(#[from] ReplicaError),
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Unreadable trace.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// An event names a host the cluster does not have.
    #[error("{host} is not part of the cluster ({hosts} hosts)")]
    UnknownHost {
        /// Host named by the event.
        host: HostId,
        /// Number of hosts in the cluster.
        hosts: usize,
    },
    /// Kernel failure.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// A type alias for `Result<T, BeefsError>`.
pub type BeefsResult<T> = Result<T, BeefsError>;
