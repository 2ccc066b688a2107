//! Data placement: decides where a new file's primary and replicas live.
//!
//! When the metadata server sees a path for the first time it asks the
//! placement strategy for one primary with enough free space and up to
//! `replication_level` secondaries.
//!
//! # Strategies
//!
//! - [`RandomPlacement`]: primary and secondaries drawn uniformly.
//! - [`CoLocatedPlacement`]: primary on the client's own host when it has
//!   room, secondaries drawn uniformly from the rest.

mod colocated;
mod random;

use std::fmt;
use std::str::FromStr;

pub use colocated::CoLocatedPlacement;
pub use random::RandomPlacement;

use crate::cluster::Cluster;
use crate::error::ConfigError;
use crate::file::{FileReplica, ReplicatedFile};
use crate::machine::HostId;

/// Errors from placement operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// The cluster has no data server at all.
    #[error("no data server available for {path}")]
    NoServers {
        /// The file that could not be placed.
        path: String,
    },
    /// No data server has enough free space for the primary.
    #[error("no data server has {size} free bytes for {path}")]
    NoSpace {
        /// The file that could not be placed.
        path: String,
        /// Bytes required on the primary.
        size: u64,
    },
}

/// Strategy for choosing where a new file is stored.
pub trait DataPlacement: fmt::Debug {
    /// Chooses a primary with at least `size` free bytes and up to
    /// `replication_level` secondaries, reserving an empty replica on each.
    fn create_file(
        &self,
        cluster: &mut Cluster,
        client: HostId,
        path: &str,
        replication_level: usize,
        size: u64,
    ) -> Result<ReplicatedFile, PlacementError>;
}

/// Placement strategies selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    /// `random`
    Random,
    /// `co-random` or `co-located-random`
    CoLocatedRandom,
}

impl PlacementKind {
    /// Instantiates the strategy.
    pub fn build(self) -> Box<dyn DataPlacement> {
        match self {
            PlacementKind::Random => Box::new(RandomPlacement),
            PlacementKind::CoLocatedRandom => Box::new(CoLocatedPlacement),
        }
    }
}

impl FromStr for PlacementKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "random" => Ok(PlacementKind::Random),
            "co-random" | "co-located-random" => Ok(PlacementKind::CoLocatedRandom),
            other => Err(ConfigError::UnknownPlacement(other.to_string())),
        }
    }
}

impl fmt::Display for PlacementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementKind::Random => f.write_str("random"),
            PlacementKind::CoLocatedRandom => f.write_str("co-random"),
        }
    }
}

fn build_file(
    cluster: &mut Cluster,
    path: &str,
    primary: HostId,
    secondaries: impl IntoIterator<Item = HostId>,
    replication_level: usize,
) -> ReplicatedFile {
    let replicas = secondaries
        .into_iter()
        .take(replication_level)
        .filter_map(|server| FileReplica::reserve(cluster, server, 0))
        .collect();
    ReplicatedFile::new(path, primary, replication_level, replicas)
}
