use std::collections::HashSet;

use beefsim_kernel::Instant;

use super::{ReplicaUpdate, Replicator};
use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::file::{FileReplica, ReplicatedFile};
use crate::machine::HostId;

/// Keeps machines asleep when some other machine can take the replica.
///
/// A replica whose host is unreachable or short on space moves to a
/// reachable server with room. When no reachable server qualifies, the
/// server asleep for the longest time among those with room is woken and
/// used. When no server has room at all, the replica is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateReplicas;

impl Replicator for MigrateReplicas {
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

        let size = file.size();
        let current = file.take_replicas();
        let mut excluded: HashSet<HostId> = current.iter().map(FileReplica::server).collect();
        excluded.insert(file.primary());

        let mut updated = Vec::with_capacity(current.len());
        for mut replica in current {
            replica.release(cluster)?;
            let server = replica.server();

            let stays = cluster.machine(server).is_reachable()
                && cluster.server(server).free_space() >= size;
            let target = if stays {
                Some(server)
            } else if let Some(awake) = awake_with_room(cluster, &excluded, size) {
                Some(awake)
            } else if let Some(sleeper) = longest_asleep_with_room(cluster, &excluded, size) {
                if cluster.machine_mut(sleeper).wake_if_unreachable(now)? {
                    update.woken += 1;
                }
                Some(sleeper)
            } else {
                None
            };

            match target {
                Some(target) => {
                    if target != server {
                        update.relocated += 1;
                        tracing::debug!(path = file.path(), from = %server, to = %target, "replica relocated");
                    }
                    excluded.insert(target);
                    // every candidate was picked for having `size` bytes free
                    updated.extend(FileReplica::reserve(cluster, target, size));
                }
                None => {
                    update.dropped += 1;
                    tracing::warn!(
                        path = file.path(),
                        size,
                        %now,
                        "capacity exhausted: no data server can hold the replica"
                    );
                }
            }
        }

        file.update_replicas(updated);
        Ok(update)
    }
}

fn awake_with_room(cluster: &Cluster, excluded: &HashSet<HostId>, size: u64) -> Option<HostId> {
    cluster.ids().find(|id| {
        !excluded.contains(id)
            && cluster.machine(*id).is_reachable()
            && cluster.server(*id).free_space() >= size
    })
}

fn longest_asleep_with_room(
    cluster: &Cluster,
    excluded: &HashSet<HostId>,
    size: u64,
) -> Option<HostId> {
    cluster
        .ids()
        .filter(|id| {
            !excluded.contains(id)
                && cluster.machine(*id).can_wake()
                && cluster.server(*id).free_space() >= size
        })
        .min_by_key(|id| (cluster.machine(*id).last_transition_time(), *id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use beefsim_kernel::SimWorld;

    use super::*;
    use crate::machine::PowerState;
    use crate::testing::{idle_cluster, put_to_sleep};

    const HOUR: Duration = Duration::from_secs(3600);

    fn servers(file: &ReplicatedFile) -> Vec<HostId> {
        file.replicas().iter().map(FileReplica::server).collect()
    }

    #[test]
    fn reuses_awake_replica_holders() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000]);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);

        let update = MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(30))
            .unwrap();

        assert_eq!(update, ReplicaUpdate::default());
        assert_eq!(servers(&file), vec![HostId(1)]);
    }

    #[test]
    fn moves_replica_off_a_sleeping_host() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000, 1000]);
        put_to_sleep(&mut cluster, &world, HostId(1), Instant::from_secs(1000), HOUR);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);

        let update = MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(30))
            .unwrap();

        assert_eq!(update.relocated, 1);
        assert_eq!(update.woken, 0);
        assert_eq!(servers(&file), vec![HostId(2)]);
        assert_eq!(cluster.machine(HostId(1)).state(), PowerState::Sleeping);
    }

    #[test]
    fn wakes_the_longest_sleeper_when_everyone_sleeps() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000, 1000, 1000]);
        put_to_sleep(&mut cluster, &world, HostId(1), Instant::from_secs(1010), HOUR);
        put_to_sleep(&mut cluster, &world, HostId(2), Instant::from_secs(1000), HOUR);
        put_to_sleep(&mut cluster, &world, HostId(3), Instant::from_secs(1011), HOUR);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);

        let update = MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(2000))
            .unwrap();

        assert_eq!(servers(&file), vec![HostId(2)]);
        assert_eq!(update.woken, 1);
        assert_eq!(cluster.machine(HostId(2)).state(), PowerState::WakingUp);
    }

    #[test]
    fn never_picks_a_sleeper_without_room() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000, 10, 1000]);
        put_to_sleep(&mut cluster, &world, HostId(1), Instant::from_secs(1010), HOUR);
        // longest asleep, but too small
        put_to_sleep(&mut cluster, &world, HostId(2), Instant::from_secs(1000), HOUR);
        put_to_sleep(&mut cluster, &world, HostId(3), Instant::from_secs(1011), HOUR);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);
        file.write(&mut cluster, 100, 100, Instant::from_secs(2000));

        MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(2000))
            .unwrap();

        assert_eq!(servers(&file), vec![HostId(3)]);
        assert_eq!(cluster.machine(HostId(2)).state(), PowerState::Sleeping);
    }

    #[test]
    fn degrades_replication_when_capacity_is_exhausted() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000, 10]);
        put_to_sleep(&mut cluster, &world, HostId(1), Instant::from_secs(1000), HOUR);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);
        file.write(&mut cluster, 100, 100, Instant::from_secs(2000));

        let update = MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(2000))
            .unwrap();

        assert_eq!(update.dropped, 1);
        assert!(file.actual_replication_level() < file.expected_replication_level());
    }

    #[test]
    fn wakes_a_sleeping_primary_first() {
        let world = SimWorld::new();
        let mut cluster = idle_cluster(&world, &[1000, 1000]);
        put_to_sleep(&mut cluster, &world, HostId(0), Instant::from_secs(1000), HOUR);
        let replica = FileReplica::reserve(&mut cluster, HostId(1), 0).unwrap();
        let mut file = ReplicatedFile::new("/the/file/path", HostId(0), 1, vec![replica]);

        let update = MigrateReplicas
            .update_replicas(&mut cluster, &mut file, Instant::from_secs(2000))
            .unwrap();

        assert_eq!(update.woken, 1);
        assert_eq!(cluster.machine(HostId(0)).state(), PowerState::WakingUp);
        assert_eq!(servers(&file), vec![HostId(1)]);
    }
}
