use beefsim_kernel::Instant;

use super::{ReplicaUpdate, Replicator};
use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::file::{FileReplica, ReplicatedFile};

/// Replicas never move and nobody is woken.
///
/// Replicas on reachable hosts are refreshed to the current size; the others
/// stay stale until a later update finds their host awake.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverMigrate;

impl Replicator for NeverMigrate {
    fn update_replicas(
        &self,
        cluster: &mut Cluster,
        file: &mut ReplicatedFile,
        _now: Instant,
    ) -> BeefsResult<ReplicaUpdate> {
        let size = file.size();
        let mut update = ReplicaUpdate::default();
        let mut updated = Vec::with_capacity(file.actual_replication_level());
        for mut replica in file.take_replicas() {
            let server = replica.server();
            if !cluster.machine(server).is_reachable() {
                updated.push(replica);
                continue;
            }
            replica.release(cluster)?;
            match FileReplica::reserve(cluster, server, size) {
                Some(refreshed) => updated.push(refreshed),
                None => {
                    update.dropped += 1;
                    tracing::warn!(
                        path = file.path(),
                        %server,
                        size,
                        "capacity exhausted: replica dropped"
                    );
                }
            }
        }
        file.update_replicas(updated);
        Ok(update)
    }
}
