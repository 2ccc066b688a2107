use beefsim_kernel::Instant;

use super::{ReplicaUpdate, Replicator};
use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::file::{FileReplica, ReplicatedFile};

/// Replicas stay bound to their data servers; sleeping hosts are woken.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faithful;

impl Replicator for Faithful {
    fn update_replicas(
        &self,
        cluster: &mut Cluster,
        file: &mut ReplicatedFile,
        now: Instant,
    ) -> BeefsResult<ReplicaUpdate> {
        let mut update = ReplicaUpdate::default();
        if cluster.machine_mut(file.primary()).wake_if_unreachable(now)? {
            update.woken += 1;
        }

        let mut refreshed = Vec::with_capacity(file.actual_replication_level());
        for mut replica in file.take_replicas() {
            replica.release(cluster)?;
            let server = replica.server();
            if cluster.machine_mut(server).wake_if_unreachable(now)? {
                update.woken += 1;
            }
            match FileReplica::reserve(cluster, server, file.size()) {
                Some(replica) => refreshed.push(replica),
                None => {
                    update.dropped += 1;
                    tracing::warn!(
                        path = file.path(),
                        %server,
                        size = file.size(),
                        %now,
                        "capacity exhausted: replica dropped"
                    );
                }
            }
        }
        file.update_replicas(refreshed);
        Ok(update)
    }
}
