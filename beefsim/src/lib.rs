//! # beefsim
//!
//! Energy simulation of a replicated distributed file system whose data
//! servers run on desktop machines that sleep when their users leave them
//! alone.
//!
//! Per-host user activity traces and file-system traces are replayed on top
//! of the [`beefsim_kernel`] event world:
//!
//! - Each [`Machine`] follows a power-state machine (idle, active, going to
//!   sleep, sleeping, waking up) and accumulates the delay its transitions
//!   add to the trace.
//! - A [`MetadataServer`] places new files with a [`DataPlacement`] strategy
//!   and resynchronizes replicas with a [`Replicator`] some time after the
//!   last close.
//! - A [`FileSystemClient`] per host issues reads and writes, waking sleeping
//!   data servers with wake-on-LAN when allowed.
//!
//! At the end of a run, each machine's timeline is combined with the I/O its
//! data server served and priced by an energy model.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use beefsim::{HostId, SimEvent, SimulationBuilder, UserIdleness};
//! use beefsim_kernel::Instant;
//!
//! let mut sim = SimulationBuilder::new()
//!     .host("jurupoca", 1 << 30)
//!     .sleep_timeout(Duration::from_secs(15 * 60))
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! sim.schedule(
//!     Instant::GENESIS,
//!     SimEvent::UserIdleness(UserIdleness {
//!         host: HostId(0),
//!         duration: Duration::from_secs(3600),
//!         delayable: true,
//!     }),
//! )
//! .unwrap();
//!
//! let summary = sim.run().unwrap();
//! assert_eq!(summary.hosts[0].transitions, 1);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// File-system clients.
pub mod client;
/// The set of data servers.
pub mod cluster;
/// Configuration loading.
pub mod config;
/// Data servers.
pub mod data_server;
/// Energy accounting.
pub mod energy;
/// Error types.
pub mod error;
/// Domain events.
pub mod events;
/// Replicated files.
pub mod file;
/// Machine power-state machine.
pub mod machine;
/// The metadata server.
pub mod metadata;
/// Data placement strategies.
pub mod placement;
/// Replica update strategies.
pub mod replication;
/// Run summary.
pub mod report;
/// Simulation assembly and dispatch.
pub mod simulation;
/// Trace readers.
pub mod trace;

#[cfg(test)]
mod testing;

pub use client::{ClientCounters, FileSystemClient};
pub use cluster::{Cluster, FreeSpaceWatermark};
pub use config::SimulationConfig;
pub use data_server::DataServer;
pub use energy::{
    EnergyConsumptionModel, EnergyState, EnergyStateInterval, LinearPowerModel, PowerMode,
    PowerProfile,
};
pub use error::{
    BeefsError, BeefsResult, ConfigError, MachineError, ReplicaError, TraceError,
};
pub use events::{
    Close, Lasting, Read, SampleFreeSpace, SimEvent, Sleep, Unlink, UpdateFileReplicas,
    UserActivity, UserIdleness, WakeOnLan, Write,
};
pub use file::{FileReplica, ReplicatedFile, WriteOutcome};
pub use machine::{HostId, Machine, PowerState, StateInterval};
pub use metadata::{MetadataCounters, MetadataServer};
pub use placement::{DataPlacement, PlacementError, PlacementKind};
pub use replication::{ReplicaUpdate, Replicator, ReplicatorKind};
pub use report::{HostSummary, SimulationSummary};
pub use simulation::{Simulation, SimulationBuilder, SimulationState};
