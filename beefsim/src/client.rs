//! File-system clients: one per host, replaying that host's file trace.

use std::time::Duration;

use beefsim_kernel::{Instant, Interval, WeakSimWorld};

use crate::cluster::Cluster;
use crate::error::BeefsResult;
use crate::events::{Read, SimEvent, Write};
use crate::machine::HostId;
use crate::metadata::MetadataServer;

/// Slack added on top of the transition duration when a request waits for
/// its data server to wake up.
pub const RESUBMIT_SLACK: Duration = Duration::from_secs(1);

/// Counters kept by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCounters {
    /// Reads served by an awake primary.
    pub reads: u64,
    /// Writes served by an awake primary.
    pub writes: u64,
    /// Reads dropped because the client's own host was not reachable.
    pub reads_while_client_asleep: u64,
    /// Writes dropped because the client's own host was not reachable.
    pub writes_while_client_asleep: u64,
    /// Reads dropped because the data server could not be reached or woken.
    pub reads_while_data_server_asleep: u64,
    /// Writes dropped because the data server could not be reached or woken.
    pub writes_while_data_server_asleep: u64,
    /// Requests re-submitted after waking their data server.
    pub resubmitted: u64,
    /// Replicas promoted to primary to serve a write.
    pub promotions: u64,
    /// Writes truncated because the primary was full.
    pub disk_full_writes: u64,
    /// Bytes that did not fit on the primary.
    pub bytes_not_written: u64,
}

impl ClientCounters {
    /// Adds `other` into `self`.
    pub fn accumulate(&mut self, other: &ClientCounters) {
        self.reads += other.reads;
        self.writes += other.writes;
        self.reads_while_client_asleep += other.reads_while_client_asleep;
        self.writes_while_client_asleep += other.writes_while_client_asleep;
        self.reads_while_data_server_asleep += other.reads_while_data_server_asleep;
        self.writes_while_data_server_asleep += other.writes_while_data_server_asleep;
        self.resubmitted += other.resubmitted;
        self.promotions += other.promotions;
        self.disk_full_writes += other.disk_full_writes;
        self.bytes_not_written += other.bytes_not_written;
    }
}

/// Issues file operations on behalf of the user of one host.
#[derive(Debug)]
pub struct FileSystemClient {
    host: HostId,
    wake_on_lan: bool,
    counters: ClientCounters,
    world: WeakSimWorld<SimEvent>,
}

impl FileSystemClient {
    /// Creates the client running on `host`.
    pub fn new(host: HostId, wake_on_lan: bool, world: WeakSimWorld<SimEvent>) -> Self {
        Self {
            host,
            wake_on_lan,
            counters: ClientCounters::default(),
            world,
        }
    }

    /// Host running this client.
    pub fn host(&self) -> HostId {
        self.host
    }

    /// Counters so far.
    pub fn counters(&self) -> ClientCounters {
        self.counters
    }

    /// Reads `bytes` from `path` during `[begin, begin + duration)`.
    pub fn read(
        &mut self,
        cluster: &mut Cluster,
        metadata: &mut MetadataServer,
        path: &str,
        bytes: u64,
        begin: Instant,
        duration: Duration,
    ) -> BeefsResult<()> {
        if !cluster.machine(self.host).is_reachable() {
            self.counters.reads_while_client_asleep += 1;
            tracing::debug!(client = %self.host, path, %begin, "read dropped: client asleep");
            return Ok(());
        }
        let Some(file) = metadata.create_or_open(cluster, self.host, path, 0) else {
            return Ok(());
        };
        let primary = file.primary();

        if cluster.machine(primary).is_reachable() {
            cluster
                .server_mut(primary)
                .record_read(Interval::starting_at(begin, duration));
            self.counters.reads += 1;
            return Ok(());
        }

        if self.wake_and_resubmit(cluster, primary, begin, |client| {
            SimEvent::Read(Read {
                client,
                path: path.to_string(),
                bytes,
                duration,
                delayable: false,
            })
        })? {
            return Ok(());
        }
        self.counters.reads_while_data_server_asleep += 1;
        tracing::debug!(client = %self.host, %primary, path, %begin, "read dropped: data server asleep");
        Ok(())
    }

    /// Writes `bytes` to `path` during `[begin, begin + duration)`; the trace
    /// reports `file_size` once the call returns.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        cluster: &mut Cluster,
        metadata: &mut MetadataServer,
        path: &str,
        bytes: u64,
        file_size: u64,
        begin: Instant,
        duration: Duration,
    ) -> BeefsResult<()> {
        if !cluster.machine(self.host).is_reachable() {
            self.counters.writes_while_client_asleep += 1;
            tracing::debug!(client = %self.host, path, %begin, "write dropped: client asleep");
            return Ok(());
        }
        let Some(file) = metadata.create_or_open(cluster, self.host, path, file_size) else {
            return Ok(());
        };

        if !cluster.machine(file.primary()).is_reachable() && file.are_replicas_consistent() {
            let awake_replica = file
                .replicas()
                .iter()
                .position(|replica| cluster.machine(replica.server()).is_reachable());
            if let Some(index) = awake_replica {
                if file.promote_replica(cluster, index)? {
                    self.counters.promotions += 1;
                }
            }
        }

        let primary = file.primary();
        if cluster.machine(primary).is_reachable() {
            let outcome = file.write(cluster, bytes, file_size, begin);
            if outcome.shortfall > 0 {
                self.counters.disk_full_writes += 1;
                self.counters.bytes_not_written += outcome.shortfall;
            }
            cluster
                .server_mut(primary)
                .record_write(Interval::starting_at(begin, duration));
            self.counters.writes += 1;
            return Ok(());
        }

        if self.wake_and_resubmit(cluster, primary, begin, |client| {
            SimEvent::Write(Write {
                client,
                path: path.to_string(),
                bytes,
                file_size,
                duration,
                delayable: false,
            })
        })? {
            return Ok(());
        }
        self.counters.writes_while_data_server_asleep += 1;
        tracing::debug!(client = %self.host, %primary, path, %begin, "write dropped: data server asleep");
        Ok(())
    }

    /// Asks the metadata server to bring `path`'s replicas back in sync.
    pub fn close(&mut self, metadata: &mut MetadataServer, path: &str) -> BeefsResult<()> {
        metadata.close(path)?;
        Ok(())
    }

    /// Removes `path` from the namespace.
    pub fn delete(
        &mut self,
        cluster: &mut Cluster,
        metadata: &mut MetadataServer,
        path: &str,
    ) -> BeefsResult<()> {
        if !metadata.delete(cluster, path)? {
            tracing::debug!(client = %self.host, path, "unlink of unknown file");
        }
        Ok(())
    }

    /// Wakes `server` and schedules `request` once it is up.
    ///
    /// Returns `false` when wake-on-LAN is disabled or the server cannot be
    /// woken, leaving the request to be dropped.
    fn wake_and_resubmit(
        &mut self,
        cluster: &mut Cluster,
        server: HostId,
        begin: Instant,
        request: impl FnOnce(HostId) -> SimEvent,
    ) -> BeefsResult<bool> {
        let machine = cluster.machine_mut(server);
        if !self.wake_on_lan || !machine.can_wake() {
            return Ok(false);
        }
        machine.wake_on_lan(begin)?;
        let retry_at = begin + machine.transition_duration() + RESUBMIT_SLACK;
        self.world.schedule_at(retry_at, request(self.host))?;
        self.counters.resubmitted += 1;
        tracing::debug!(client = %self.host, %server, %retry_at, "data server woken, request re-submitted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use beefsim_kernel::SimWorld;

    use super::*;
    use crate::machine::PowerState;
    use crate::placement::CoLocatedPlacement;
    use crate::replication::Faithful;
    use crate::testing::{idle_cluster, put_to_sleep, TD};

    const HOUR: Duration = Duration::from_secs(3600);

    fn setup(
        world: &SimWorld<SimEvent>,
        capacities: &[u64],
    ) -> (Cluster, MetadataServer, FileSystemClient) {
        let cluster = idle_cluster(world, capacities);
        let metadata = MetadataServer::new(
            &cluster,
            Box::new(CoLocatedPlacement),
            Box::new(Faithful),
            1,
            Duration::from_secs(30),
            world.downgrade(),
        );
        let client = FileSystemClient::new(HostId(1), true, world.downgrade());
        (cluster, metadata, client)
    }

    fn resubmitted(world: &SimWorld<SimEvent>) -> Vec<(Instant, SimEvent)> {
        world
            .pending_events()
            .into_iter()
            .filter(|(_, event)| matches!(event, SimEvent::Read(_) | SimEvent::Write(_)))
            .collect()
    }

    #[test]
    fn read_from_awake_primary_records_interval() {
        let world = SimWorld::new();
        let (mut cluster, mut metadata, mut client) = setup(&world, &[1000, 1000]);
        let begin = Instant::from_secs(10);
        client
            .read(&mut cluster, &mut metadata, "/a", 5, begin, Duration::from_millis(3))
            .unwrap();

        assert_eq!(client.counters().reads, 1);
        assert_eq!(
            cluster.server(HostId(1)).read_intervals(),
            &[Interval::starting_at(begin, Duration::from_millis(3))]
        );
    }

    #[test]
    fn write_to_sleeping_primary_is_rescheduled() {
        let world = SimWorld::new();
        let capacity = 1000 * 1024 * 1024;
        let (mut cluster, mut metadata, mut client) = setup(&world, &[capacity, capacity]);
        let mut owner = FileSystemClient::new(HostId(0), true, world.downgrade());
        owner
            .write(
                &mut cluster,
                &mut metadata,
                "/shared",
                1024,
                1024,
                Instant::from_secs(10),
                Duration::from_millis(1),
            )
            .unwrap();
        put_to_sleep(&mut cluster, &world, HostId(0), Instant::from_secs(1000), HOUR);

        let issued = Instant::from_secs(2000);
        client
            .write(
                &mut cluster,
                &mut metadata,
                "/shared",
                1024,
                1024 * 1024,
                issued,
                Duration::from_millis(1),
            )
            .unwrap();

        assert_eq!(cluster.machine(HostId(0)).state(), PowerState::WakingUp);
        let pending = resubmitted(&world);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, issued + TD + RESUBMIT_SLACK);
        assert_eq!(pending[0].1.delay_target(), None);
        assert_eq!(client.counters().resubmitted, 1);
        assert_eq!(client.counters().writes, 0);
    }

    #[test]
    fn write_promotes_consistent_awake_replica() {
        let world = SimWorld::new();
        let (mut cluster, mut metadata, _) = setup(&world, &[1000, 1000]);
        metadata.create_or_open(&mut cluster, HostId(0), "/a", 0).unwrap();
        put_to_sleep(&mut cluster, &world, HostId(0), Instant::from_secs(1000), HOUR);
        let mut client = FileSystemClient::new(HostId(1), false, world.downgrade());

        client
            .write(
                &mut cluster,
                &mut metadata,
                "/a",
                100,
                100,
                Instant::from_secs(2000),
                Duration::from_millis(1),
            )
            .unwrap();

        let file = metadata.file("/a").unwrap();
        assert_eq!(file.primary(), HostId(1));
        assert_eq!(file.bytes_written(), 100);
        assert_eq!(client.counters().promotions, 1);
        assert_eq!(cluster.machine(HostId(0)).state(), PowerState::Sleeping);
        assert!(!file.are_replicas_consistent());
    }

    #[test]
    fn requests_without_wake_on_lan_are_dropped() {
        let world = SimWorld::new();
        let (mut cluster, mut metadata, _) = setup(&world, &[1000, 1000]);
        let file = metadata.create_or_open(&mut cluster, HostId(0), "/a", 0).unwrap();
        file.write(&mut cluster, 10, 10, Instant::from_secs(10));
        put_to_sleep(&mut cluster, &world, HostId(0), Instant::from_secs(1000), HOUR);
        let mut client = FileSystemClient::new(HostId(1), false, world.downgrade());

        client
            .read(&mut cluster, &mut metadata, "/a", 5, Instant::from_secs(2000), Duration::ZERO)
            .unwrap();
        client
            .write(&mut cluster, &mut metadata, "/a", 5, 15, Instant::from_secs(2000), Duration::ZERO)
            .unwrap();

        assert_eq!(client.counters().reads_while_data_server_asleep, 1);
        assert_eq!(client.counters().writes_while_data_server_asleep, 1);
        assert!(resubmitted(&world).is_empty());
        assert_eq!(cluster.machine(HostId(0)).state(), PowerState::Sleeping);
    }

    #[test]
    fn requests_from_sleeping_client_are_dropped() {
        let world = SimWorld::new();
        let (mut cluster, mut metadata, mut client) = setup(&world, &[1000, 1000]);
        put_to_sleep(&mut cluster, &world, HostId(1), Instant::from_secs(1000), HOUR);

        client
            .read(&mut cluster, &mut metadata, "/a", 5, Instant::from_secs(2000), Duration::ZERO)
            .unwrap();
        client
            .write(&mut cluster, &mut metadata, "/a", 5, 5, Instant::from_secs(2000), Duration::ZERO)
            .unwrap();

        assert_eq!(client.counters().reads_while_client_asleep, 1);
        assert_eq!(client.counters().writes_while_client_asleep, 1);
        assert_eq!(metadata.file_count(), 0);
    }
}
