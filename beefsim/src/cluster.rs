//! The set of data servers taking part in a run.

use std::time::Duration;

use beefsim_kernel::WeakSimWorld;

use crate::data_server::DataServer;
use crate::events::SimEvent;
use crate::machine::{HostId, Machine};

/// Lowest aggregate free space observed across the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeSpaceWatermark {
    minimum: Option<u64>,
    observations: u64,
}

impl FreeSpaceWatermark {
    /// Records the cluster's current aggregate free space.
    pub fn observe(&mut self, total_free: u64) {
        self.observations += 1;
        self.minimum = Some(self.minimum.map_or(total_free, |min| min.min(total_free)));
    }

    /// Lowest value observed, `None` until the first disk change.
    pub fn minimum(&self) -> Option<u64> {
        self.minimum
    }

    /// Number of disk changes observed.
    pub fn observations(&self) -> u64 {
        self.observations
    }
}

/// Every data server of the simulated file system, indexed by [`HostId`].
#[derive(Debug, Default)]
pub struct Cluster {
    servers: Vec<DataServer>,
    watermark: FreeSpaceWatermark,
}

impl Cluster {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host with its machine and data server, returning its id.
    pub fn add_host(
        &mut self,
        name: impl Into<String>,
        capacity: u64,
        sleep_timeout: Duration,
        transition_duration: Duration,
        world: WeakSimWorld<SimEvent>,
    ) -> HostId {
        let id = HostId(self.servers.len());
        let machine = Machine::new(id, name, sleep_timeout, transition_duration, world);
        self.servers.push(DataServer::new(machine, capacity));
        id
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// `true` if the cluster has no host.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// All host ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = HostId> + '_ {
        self.servers.iter().map(DataServer::id)
    }

    /// All data servers in insertion order.
    pub fn servers(&self) -> &[DataServer] {
        &self.servers
    }

    /// Looks a host up by machine name.
    pub fn host_by_name(&self, name: &str) -> Option<HostId> {
        self.servers
            .iter()
            .find(|server| server.machine().name() == name)
            .map(DataServer::id)
    }

    // HostIds are only minted by `add_host`, so indexing is in bounds.

    /// The data server of `id`.
    pub fn server(&self, id: HostId) -> &DataServer {
        &self.servers[id.0]
    }

    /// Mutable data server of `id`.
    pub fn server_mut(&mut self, id: HostId) -> &mut DataServer {
        &mut self.servers[id.0]
    }

    /// The machine of `id`.
    pub fn machine(&self, id: HostId) -> &Machine {
        self.servers[id.0].machine()
    }

    /// Mutable machine of `id`.
    pub fn machine_mut(&mut self, id: HostId) -> &mut Machine {
        self.servers[id.0].machine_mut()
    }

    /// Reserves `bytes` on `id` and updates the watermark.
    ///
    /// Returns `false`, leaving the server untouched, when `bytes` exceed its
    /// free space.
    pub fn use_disk(&mut self, id: HostId, bytes: u64) -> bool {
        if !self.servers[id.0].use_disk(bytes) {
            return false;
        }
        self.notify_disk_use_change();
        true
    }

    /// Releases `bytes` on `id` and updates the watermark.
    pub fn clean_disk(&mut self, id: HostId, bytes: u64) {
        self.servers[id.0].clean_disk(bytes);
        self.notify_disk_use_change();
    }

    /// Sum of every server's free space.
    pub fn total_free_space(&self) -> u64 {
        self.servers.iter().map(DataServer::free_space).sum()
    }

    /// The aggregate free-space tracker.
    pub fn watermark(&self) -> &FreeSpaceWatermark {
        &self.watermark
    }

    fn notify_disk_use_change(&mut self) {
        let total = self.total_free_space();
        self.watermark.observe(total);
    }
}
