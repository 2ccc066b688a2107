//! The metadata server: file namespace and replica coherence.

use std::collections::HashMap;
use std::time::Duration;

use beefsim_kernel::{EventId, Instant, WeakSimWorld};

use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::events::{SimEvent, UpdateFileReplicas};
use crate::file::ReplicatedFile;
use crate::machine::HostId;
use crate::placement::DataPlacement;
use crate::replication::Replicator;

/// Counters kept by the metadata server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataCounters {
    /// Files that could not be placed.
    pub placement_failures: u64,
    /// Replica resynchronizations run.
    pub replica_updates: u64,
    /// Replicas moved to another server.
    pub relocations: u64,
    /// Wake-on-LAN signals sent by the replicator.
    pub wakeups: u64,
    /// Replicas dropped for lack of space.
    pub capacity_exhaustions: u64,
}

/// Owns the namespace and schedules debounced replica updates.
#[derive(Debug)]
pub struct MetadataServer {
    placement: Box<dyn DataPlacement>,
    replicator: Box<dyn Replicator>,
    replication_level: usize,
    time_to_coherence: Duration,
    files: HashMap<String, ReplicatedFile>,
    data_server_by_host: HashMap<String, HostId>,
    pending_updates: HashMap<String, EventId>,
    counters: MetadataCounters,
    world: WeakSimWorld<SimEvent>,
}

impl MetadataServer {
    /// Creates a metadata server for every data server of `cluster`.
    pub fn new(
        cluster: &Cluster,
        placement: Box<dyn DataPlacement>,
        replicator: Box<dyn Replicator>,
        replication_level: usize,
        time_to_coherence: Duration,
        world: WeakSimWorld<SimEvent>,
    ) -> Self {
        let data_server_by_host = cluster
            .servers()
            .iter()
            .map(|server| (server.machine().name().to_string(), server.id()))
            .collect();
        Self {
            placement,
            replicator,
            replication_level,
            time_to_coherence,
            files: HashMap::new(),
            data_server_by_host,
            pending_updates: HashMap::new(),
            counters: MetadataCounters::default(),
            world,
        }
    }

    /// Returns the file at `path`, placing it first if it does not exist yet.
    ///
    /// `None` when placement fails; the failure is logged and counted.
    pub fn create_or_open(
        &mut self,
        cluster: &mut Cluster,
        client: HostId,
        path: &str,
        size: u64,
    ) -> Option<&mut ReplicatedFile> {
        if !self.files.contains_key(path) {
            match self
                .placement
                .create_file(cluster, client, path, self.replication_level, size)
            {
                Ok(file) => {
                    tracing::debug!(
                        path,
                        primary = %file.primary(),
                        replicas = file.actual_replication_level(),
                        "file created"
                    );
                    self.files.insert(path.to_string(), file);
                }
                Err(err) => {
                    self.counters.placement_failures += 1;
                    tracing::warn!(%client, %err, "placement failed, operation dropped");
                    return None;
                }
            }
        }
        self.files.get_mut(path)
    }

    /// Removes the file at `path`, releasing its primary bytes and replicas.
    ///
    /// Returns whether the file existed.
    pub fn delete(&mut self, cluster: &mut Cluster, path: &str) -> BeefsResult<bool> {
        let Some(mut file) = self.files.remove(path) else {
            return Ok(false);
        };
        if let Some(pending) = self.pending_updates.remove(path) {
            self.world.cancel(pending)?;
        }
        file.delete(cluster)?;
        Ok(true)
    }

    /// Schedules a replica update `time_to_coherence` from now if the file
    /// has stale replicas, replacing any update already pending for it.
    ///
    /// Returns whether an update was scheduled.
    pub fn close(&mut self, path: &str) -> BeefsResult<bool> {
        let needs_update = self.files.get(path).is_some_and(|file| {
            file.actual_replication_level() > 0 && !file.are_replicas_consistent()
        });
        if !needs_update {
            return Ok(false);
        }

        if let Some(previous) = self.pending_updates.remove(path) {
            self.world.cancel(previous)?;
        }
        let id = self.world.schedule_after(
            self.time_to_coherence,
            SimEvent::UpdateFileReplicas(UpdateFileReplicas {
                path: path.to_string(),
            }),
        )?;
        self.pending_updates.insert(path.to_string(), id);
        Ok(true)
    }

    /// Runs the replicator on the file at `path`, if it still exists.
    pub fn update_replicas(
        &mut self,
        cluster: &mut Cluster,
        path: &str,
        now: Instant,
    ) -> BeefsResult<()> {
        self.pending_updates.remove(path);
        let Some(file) = self.files.get_mut(path) else {
            tracing::debug!(path, "file removed before its replicas were updated");
            return Ok(());
        };

        let update = self.replicator.update_replicas(cluster, file, now)?;
        self.counters.replica_updates += 1;
        self.counters.relocations += update.relocated as u64;
        self.counters.wakeups += update.woken as u64;
        self.counters.capacity_exhaustions += update.dropped as u64;
        Ok(())
    }

    /// The file at `path`, if any.
    pub fn file(&self, path: &str) -> Option<&ReplicatedFile> {
        self.files.get(path)
    }

    /// Mutable file at `path`, if any.
    pub fn file_mut(&mut self, path: &str) -> Option<&mut ReplicatedFile> {
        self.files.get_mut(path)
    }

    /// Number of files in the namespace.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Data server running on the host named `host`.
    pub fn data_server(&self, host: &str) -> Option<HostId> {
        self.data_server_by_host.get(host).copied()
    }

    /// Replica update currently pending for `path`.
    pub fn pending_update(&self, path: &str) -> Option<EventId> {
        self.pending_updates.get(path).copied()
    }

    /// Counters so far.
    pub fn counters(&self) -> MetadataCounters {
        self.counters
    }
}
