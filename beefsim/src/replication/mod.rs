//! Replicators: bring a file's replica set back in line with the primary.
//!
//! The metadata server invokes its replicator when a debounced
//! [`UpdateFileReplicas`](crate::events::UpdateFileReplicas) fires. What
//! happens to replicas on sleeping hosts is the whole difference between
//! strategies.

mod faithful;
mod migrate;
mod never_migrate;
mod noop;

use std::fmt;
use std::str::FromStr;

use beefsim_kernel::Instant;

pub use faithful::Faithful;
pub use migrate::MigrateReplicas;
pub use never_migrate::NeverMigrate;
pub use noop::Noop;

use crate::cluster::Cluster;
use crate::error::{BeefsResult, ConfigError};
use crate::file::ReplicatedFile;

/// What a replica update did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaUpdate {
    /// Wake-on-LAN signals sent.
    pub woken: usize,
    /// Replicas moved to another server.
    pub relocated: usize,
    /// Replicas dropped because no server had room.
    pub dropped: usize,
}

/// Strategy for resynchronizing a file's replicas.
pub trait Replicator: fmt::Debug {
    /// Updates `file`'s replicas at `now`.
    fn update_replicas(
        &self,
        cluster: &mut Cluster,
        file: &mut ReplicatedFile,
        now: Instant,
    ) -> BeefsResult<ReplicaUpdate>;
}

/// Replicators selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorKind {
    /// `faithful`
    Faithful,
    /// `kind` or `migrate`
    Migrate,
    /// `noop`
    Noop,
    /// `never-migrate`
    NeverMigrate,
}

impl ReplicatorKind {
    /// Instantiates the strategy.
    pub fn build(self) -> Box<dyn Replicator> {
        match self {
            ReplicatorKind::Faithful => Box::new(Faithful),
            ReplicatorKind::Migrate => Box::new(MigrateReplicas),
            ReplicatorKind::Noop => Box::new(Noop),
            ReplicatorKind::NeverMigrate => Box::new(NeverMigrate),
        }
    }
}

impl FromStr for ReplicatorKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "faithful" => Ok(ReplicatorKind::Faithful),
            "kind" | "migrate" => Ok(ReplicatorKind::Migrate),
            "noop" => Ok(ReplicatorKind::Noop),
            "never-migrate" => Ok(ReplicatorKind::NeverMigrate),
            other => Err(ConfigError::UnknownReplicator(other.to_string())),
        }
    }
}

impl fmt::Display for ReplicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicatorKind::Faithful => "faithful",
            ReplicatorKind::Migrate => "kind",
            ReplicatorKind::Noop => "noop",
            ReplicatorKind::NeverMigrate => "never-migrate",
        };
        f.write_str(name)
    }
}
