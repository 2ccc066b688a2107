//! Replicated files and their replicas.

use beefsim_kernel::Instant;

use crate::cluster::Cluster;
use crate::error::ReplicaError;
use crate::machine::HostId;

/// A secondary copy of a file on one data server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReplica {
    server: HostId,
    size: u64,
    consistent: bool,
    deleted: bool,
}

impl FileReplica {
    /// Creates a consistent replica, charging `size` bytes to `server`.
    ///
    /// Returns `None` when `server` does not have `size` bytes free.
    pub fn reserve(cluster: &mut Cluster, server: HostId, size: u64) -> Option<Self> {
        if !cluster.use_disk(server, size) {
            return None;
        }
        Some(Self {
            server,
            size,
            consistent: true,
            deleted: false,
        })
    }

    /// Server holding the replica.
    pub fn server(&self) -> HostId {
        self.server
    }

    /// Bytes reserved for the replica.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `false` once the primary received bytes this replica has not.
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Marks the replica stale.
    pub fn invalidate(&mut self) {
        self.consistent = false;
    }

    /// `true` once released.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Gives the reserved bytes back. Releasing twice is an error.
    pub fn release(&mut self, cluster: &mut Cluster) -> Result<(), ReplicaError> {
        if self.deleted {
            return Err(ReplicaError::AlreadyDeleted {
                server: self.server,
            });
        }
        cluster.clean_disk(self.server, self.size);
        self.deleted = true;
        Ok(())
    }
}

/// Result of a write applied on the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes actually stored.
    pub written: u64,
    /// Bytes that did not fit on the primary's disk.
    pub shortfall: u64,
}

/// A file with one primary and any number of replicas.
#[derive(Debug)]
pub struct ReplicatedFile {
    path: String,
    primary: HostId,
    size: u64,
    bytes_written: u64,
    expected_replication_level: usize,
    replicas: Vec<FileReplica>,
}

impl ReplicatedFile {
    /// Creates an empty file.
    pub fn new(
        path: impl Into<String>,
        primary: HostId,
        expected_replication_level: usize,
        replicas: Vec<FileReplica>,
    ) -> Self {
        Self {
            path: path.into(),
            primary,
            size: 0,
            bytes_written: 0,
            expected_replication_level,
            replicas,
        }
    }

    /// Full path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Server authoritative for the file's bytes.
    pub fn primary(&self) -> HostId {
        self.primary
    }

    /// Current size of the file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes charged to the primary's disk.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Replica count the file was created for.
    pub fn expected_replication_level(&self) -> usize {
        self.expected_replication_level
    }

    /// Replica count the file actually has.
    pub fn actual_replication_level(&self) -> usize {
        self.replicas.len()
    }

    /// Current replicas.
    pub fn replicas(&self) -> &[FileReplica] {
        &self.replicas
    }

    /// `true` iff every replica is consistent.
    pub fn are_replicas_consistent(&self) -> bool {
        self.replicas.iter().all(FileReplica::is_consistent)
    }

    /// Appends `bytes` on the primary; the trace reports `file_size` afterwards.
    ///
    /// Only what fits is stored. Any stored byte makes every replica stale.
    pub fn write(&mut self, cluster: &mut Cluster, bytes: u64, file_size: u64, now: Instant) -> WriteOutcome {
        let free = cluster.server(self.primary).free_space();
        let written = bytes.min(free);
        let shortfall = bytes - written;
        if shortfall > 0 {
            tracing::warn!(
                host = cluster.machine(self.primary).name(),
                path = %self.path,
                requested = bytes,
                free,
                %now,
                "disk full: write truncated"
            );
        }

        let stored = cluster.use_disk(self.primary, written);
        debug_assert!(stored, "a write is clamped to the primary's free space");
        self.bytes_written += written;
        self.size = file_size.saturating_sub(shortfall);
        if written > 0 {
            self.replicas.iter_mut().for_each(FileReplica::invalidate);
        }
        WriteOutcome { written, shortfall }
    }

    /// Swaps roles between the primary and the replica at `index`.
    ///
    /// The new primary takes over `bytes_written`; the old primary keeps a
    /// consistent replica of the current size if it has room for one.
    /// Returns `false`, changing nothing, when the replica's server cannot
    /// hold `bytes_written`.
    pub fn promote_replica(&mut self, cluster: &mut Cluster, index: usize) -> Result<bool, ReplicaError> {
        let Some(promoted) = self.replicas.get(index) else {
            return Ok(false);
        };
        let new_primary = promoted.server();
        let room = cluster.server(new_primary).free_space() + promoted.size();
        if room < self.bytes_written {
            tracing::warn!(
                path = %self.path,
                to = %new_primary,
                bytes = self.bytes_written,
                room,
                "capacity exhausted: replica cannot take over as primary"
            );
            return Ok(false);
        }

        let mut promoted = self.replicas.remove(index);
        promoted.release(cluster)?;
        let old_primary = self.primary;
        cluster.clean_disk(old_primary, self.bytes_written);
        let stored = cluster.use_disk(new_primary, self.bytes_written);
        debug_assert!(stored, "room was checked before releasing the replica");
        self.primary = new_primary;

        match FileReplica::reserve(cluster, old_primary, self.size) {
            Some(replica) => self.replicas.push(replica),
            None => tracing::warn!(
                path = %self.path,
                host = %old_primary,
                size = self.size,
                "capacity exhausted: former primary keeps no replica"
            ),
        }

        tracing::debug!(
            path = %self.path,
            from = %old_primary,
            to = %new_primary,
            "replica promoted to primary"
        );
        Ok(true)
    }

    /// Installs a freshly built replica set; the file is consistent again.
    pub fn update_replicas(&mut self, replicas: Vec<FileReplica>) {
        self.replicas = replicas;
    }

    /// Takes the replica set out, leaving it empty.
    pub fn take_replicas(&mut self) -> Vec<FileReplica> {
        std::mem::take(&mut self.replicas)
    }

    /// Frees the primary's bytes and releases every replica.
    pub fn delete(&mut self, cluster: &mut Cluster) -> Result<(), ReplicaError> {
        cluster.clean_disk(self.primary, self.bytes_written);
        self.bytes_written = 0;
        for replica in &mut self.replicas {
            replica.release(cluster)?;
        }
        Ok(())
    }
}
