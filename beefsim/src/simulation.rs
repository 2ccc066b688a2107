//! Simulation assembly and dispatch.
//!
//! [`SimulationBuilder`] puts hosts, strategies and trace sources together;
//! [`Simulation`] drives the world and produces a [`SimulationSummary`].

use std::path::PathBuf;
use std::time::Duration;

use beefsim_kernel::{
    EventHandler, EventSource, Instant, Interval, SimWorld, SourceId, WeakSimWorld,
    reset_sim_rng, set_sim_seed,
};
use tracing::instrument;

use crate::client::FileSystemClient;
use crate::cluster::Cluster;
use crate::config::SimulationConfig;
use crate::energy::{self, EnergyConsumptionModel, LinearPowerModel, PowerProfile};
use crate::error::{BeefsError, BeefsResult};
use crate::events::{SampleFreeSpace, SimEvent};
use crate::machine::HostId;
use crate::metadata::MetadataServer;
use crate::placement::PlacementKind;
use crate::replication::ReplicatorKind;
use crate::report::{HostSummary, SimulationSummary};
use crate::trace::{self, ActivityTraceSource, FileSystemTraceSource, MalformedLines};

/// Everything the dispatched events act upon.
#[derive(Debug)]
pub struct SimulationState {
    cluster: Cluster,
    metadata: MetadataServer,
    clients: Vec<FileSystemClient>,
    world: WeakSimWorld<SimEvent>,
}

impl SimulationState {
    /// Data servers and their machines.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// The metadata server.
    pub fn metadata(&self) -> &MetadataServer {
        &self.metadata
    }

    /// Client running on `host`.
    pub fn client(&self, host: HostId) -> Option<&FileSystemClient> {
        self.clients.get(host.0)
    }

    /// Every client, in host order.
    pub fn clients(&self) -> &[FileSystemClient] {
        &self.clients
    }

    fn check_host(&self, event: &SimEvent) -> BeefsResult<()> {
        match event.host() {
            Some(host) if host.0 >= self.clients.len() => Err(BeefsError::UnknownHost {
                host,
                hosts: self.clients.len(),
            }),
            _ => Ok(()),
        }
    }

    fn sample_free_space(&mut self, now: Instant, every: Duration) -> BeefsResult<()> {
        let free = self.cluster.total_free_space();
        tracing::info!(%now, free, "aggregate free space");
        // Re-arm only while something else is still going on.
        if self.world.has_pending_events()? {
            self.world
                .schedule_after(every, SimEvent::SampleFreeSpace(SampleFreeSpace { every }))?;
        }
        Ok(())
    }
}

impl EventHandler<SimEvent> for SimulationState {
    type Error = BeefsError;

    fn due_time(&self, event: &SimEvent, submitted_for: Instant) -> Instant {
        match event.delay_target() {
            Some(host) => match self.cluster.servers().get(host.0) {
                Some(server) => submitted_for + server.machine().effective_delay(),
                None => submitted_for,
            },
            None => submitted_for,
        }
    }

    fn handle(&mut self, now: Instant, event: SimEvent) -> BeefsResult<()> {
        tracing::trace!(%now, %event, "dispatch");
        self.check_host(&event)?;
        match event {
            SimEvent::UserActivity(e) => self.cluster.machine_mut(e.host).set_active(now, e.duration)?,
            SimEvent::UserIdleness(e) => self.cluster.machine_mut(e.host).set_idle(now, e.duration)?,
            SimEvent::Sleep(e) => self.cluster.machine_mut(e.host).set_sleeping(now, e.duration)?,
            SimEvent::WakeOnLan(e) => self.cluster.machine_mut(e.host).wake_on_lan(now)?,
            SimEvent::Read(e) => self.clients[e.client.0].read(
                &mut self.cluster,
                &mut self.metadata,
                &e.path,
                e.bytes,
                now,
                e.duration,
            )?,
            SimEvent::Write(e) => self.clients[e.client.0].write(
                &mut self.cluster,
                &mut self.metadata,
                &e.path,
                e.bytes,
                e.file_size,
                now,
                e.duration,
            )?,
            SimEvent::Close(e) => self.clients[e.client.0].close(&mut self.metadata, &e.path)?,
            SimEvent::Unlink(e) => {
                self.clients[e.client.0].delete(&mut self.cluster, &mut self.metadata, &e.path)?
            }
            SimEvent::UpdateFileReplicas(e) => {
                self.metadata
                    .update_replicas(&mut self.cluster, &e.path, now)?
            }
            SimEvent::SampleFreeSpace(e) => self.sample_free_space(now, e.every)?,
        }
        Ok(())
    }
}

/// Builder for a [`Simulation`].
#[derive(Debug, Clone)]
pub struct SimulationBuilder {
    hosts: Vec<(String, u64)>,
    placement: PlacementKind,
    replicator: ReplicatorKind,
    sleep_timeout: Duration,
    transition_duration: Duration,
    replication_level: usize,
    time_to_coherence: Duration,
    wake_on_lan: bool,
    start: Instant,
    end: Instant,
    seed: Option<u64>,
    space_log_interval: Option<Duration>,
    power: PowerProfile,
    traces_dir: Option<PathBuf>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    /// A builder with the default knobs and no hosts.
    pub fn new() -> Self {
        let defaults = SimulationConfig::default();
        Self {
            hosts: Vec::new(),
            placement: PlacementKind::CoLocatedRandom,
            replicator: ReplicatorKind::Faithful,
            sleep_timeout: defaults.sleep_timeout(),
            transition_duration: defaults.transition_duration(),
            replication_level: defaults.replication_level,
            time_to_coherence: defaults.time_to_coherence(),
            wake_on_lan: defaults.wake_on_lan,
            start: Instant::GENESIS,
            end: Instant::END_OF_TIME,
            seed: None,
            space_log_interval: None,
            power: defaults.power,
            traces_dir: None,
        }
    }

    /// Builder for the hosts found in `config.traces_dir`.
    ///
    /// A host is any name with both an `idleness-<host>` and an `fs-<host>`
    /// trace; hosts are numbered in name order.
    pub fn from_config(config: &SimulationConfig) -> BeefsResult<Self> {
        config.validate()?;
        let mut builder = Self::new()
            .placement(config.placement_kind()?)
            .replicator(config.replicator_kind()?)
            .sleep_timeout(config.sleep_timeout())
            .transition_duration(config.transition_duration())
            .replication_level(config.replication_level)
            .time_to_coherence(config.time_to_coherence())
            .wake_on_lan(config.wake_on_lan)
            .bounds(config.start(), config.end())
            .power(config.power)
            .traces_dir(config.traces_dir.clone());
        if let Some(seed) = config.seed {
            builder = builder.seed(seed);
        }
        if let Some(secs) = config.space_log_interval_secs {
            builder = builder.space_log_interval(Duration::from_secs(secs));
        }

        let hosts = trace::discover_hosts(&config.traces_dir)?;
        if hosts.is_empty() {
            tracing::warn!(traces_dir = %config.traces_dir.display(), "no host has both traces");
        }
        for name in hosts {
            let capacity = config.free_space_for(&name);
            builder = builder.host(name, capacity);
        }
        Ok(builder)
    }

    /// Adds a host with `capacity` bytes of disk.
    pub fn host(mut self, name: impl Into<String>, capacity: u64) -> Self {
        self.hosts.push((name.into(), capacity));
        self
    }

    /// Sets the data placement strategy.
    pub fn placement(mut self, placement: PlacementKind) -> Self {
        self.placement = placement;
        self
    }

    /// Sets the replicator strategy.
    pub fn replicator(mut self, replicator: ReplicatorKind) -> Self {
        self.replicator = replicator;
        self
    }

    /// Sets the idle time before sleeping.
    pub fn sleep_timeout(mut self, timeout: Duration) -> Self {
        self.sleep_timeout = timeout;
        self
    }

    /// Sets the sleep/wake transition length.
    pub fn transition_duration(mut self, duration: Duration) -> Self {
        self.transition_duration = duration;
        self
    }

    /// Sets the number of secondaries per file.
    pub fn replication_level(mut self, level: usize) -> Self {
        self.replication_level = level;
        self
    }

    /// Sets the replica update debounce.
    pub fn time_to_coherence(mut self, delay: Duration) -> Self {
        self.time_to_coherence = delay;
        self
    }

    /// Enables or disables wake-on-LAN from clients.
    pub fn wake_on_lan(mut self, enabled: bool) -> Self {
        self.wake_on_lan = enabled;
        self
    }

    /// Sets the first and last simulated instants.
    pub fn bounds(mut self, start: Instant, end: Instant) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Fixes the seed of placement draws.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Logs the aggregate free space every `interval`.
    pub fn space_log_interval(mut self, interval: Duration) -> Self {
        self.space_log_interval = Some(interval);
        self
    }

    /// Sets the power draws of the energy model.
    pub fn power(mut self, power: PowerProfile) -> Self {
        self.power = power;
        self
    }

    /// Reads every host's traces from `dir` when building.
    pub fn traces_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.traces_dir = Some(dir.into());
        self
    }

    /// Creates the world, the cluster, the servers and the trace sources.
    #[instrument(skip(self), fields(hosts = self.hosts.len()))]
    pub fn build(self) -> BeefsResult<Simulation> {
        let seed = self.seed.unwrap_or_else(wall_clock_seed);
        reset_sim_rng();
        set_sim_seed(seed);

        let world = SimWorld::with_bounds(self.start, self.end);
        let mut cluster = Cluster::new();
        for (name, capacity) in &self.hosts {
            cluster.add_host(
                name.clone(),
                *capacity,
                self.sleep_timeout,
                self.transition_duration,
                world.downgrade(),
            );
        }
        let metadata = MetadataServer::new(
            &cluster,
            self.placement.build(),
            self.replicator.build(),
            self.replication_level,
            self.time_to_coherence,
            world.downgrade(),
        );
        let clients = cluster
            .ids()
            .map(|id| FileSystemClient::new(id, self.wake_on_lan, world.downgrade()))
            .collect();

        let mut simulation = Simulation {
            state: SimulationState {
                cluster,
                metadata,
                clients,
                world: world.downgrade(),
            },
            world,
            model: Box::new(LinearPowerModel::new(self.power)),
            seed,
            malformed: Vec::new(),
        };

        if let Some(dir) = &self.traces_dir {
            for (index, (name, _)) in self.hosts.iter().enumerate() {
                let host = HostId(index);
                let activity =
                    ActivityTraceSource::open(&trace::activity_trace(dir, name), host, self.start)?;
                simulation.add_source(activity)?;
                let files = FileSystemTraceSource::open(&trace::filesystem_trace(dir, name), host)?
                    .starting_at(self.start);
                simulation.malformed.push(files.malformed_lines());
                simulation.add_source(files)?;
            }
        }

        if let Some(every) = self.space_log_interval {
            simulation
                .world
                .schedule_at(self.start, SimEvent::SampleFreeSpace(SampleFreeSpace { every }))?;
        }

        tracing::info!(
            seed,
            placement = %self.placement,
            replicator = %self.replicator,
            start = %self.start,
            end = %self.end,
            "simulation built"
        );
        Ok(simulation)
    }
}

fn wall_clock_seed() -> u64 {
    use std::time::SystemTime;

    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| fold_nanos(d.as_nanos()))
        .unwrap_or(12345)
}

/// Folds the high 64 bits of `nanos` into the low ones instead of dropping them.
fn fold_nanos(nanos: u128) -> u64 {
    (nanos as u64) ^ ((nanos >> 64) as u64)
}

/// A ready-to-run simulation.
#[derive(Debug)]
pub struct Simulation {
    world: SimWorld<SimEvent>,
    state: SimulationState,
    model: Box<dyn EnergyConsumptionModel>,
    seed: u64,
    malformed: Vec<MalformedLines>,
}

impl Simulation {
    /// The event world.
    pub fn world(&self) -> &SimWorld<SimEvent> {
        &self.world
    }

    /// Handler state: cluster, metadata server and clients.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Seed the placement draws are made with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replaces the energy model used in the summary.
    pub fn set_energy_model(&mut self, model: Box<dyn EnergyConsumptionModel>) {
        self.model = model;
    }

    /// Registers an extra event source.
    pub fn add_source<S>(&mut self, source: S) -> BeefsResult<SourceId>
    where
        S: EventSource<SimEvent> + 'static,
    {
        Ok(self.world.add_source(source)?)
    }

    /// Schedules `event` at `at`.
    ///
    /// Fails with [`BeefsError::UnknownHost`] when the event names a host the
    /// cluster does not have.
    pub fn schedule(&mut self, at: Instant, event: SimEvent) -> BeefsResult<()> {
        self.state.check_host(&event)?;
        self.world.schedule_at(at, event)?;
        Ok(())
    }

    /// Dispatches the next event. Returns `false` once nothing is left to do.
    pub fn step(&mut self) -> BeefsResult<bool> {
        self.world.step(&mut self.state)
    }

    /// Runs until the queue drains or the end instant is reached.
    pub fn run(&mut self) -> BeefsResult<SimulationSummary> {
        let started = std::time::Instant::now();
        tracing::info!(seed = self.seed, hosts = self.state.cluster.len(), "simulation started");
        self.world.run(&mut self.state)?;
        let summary = self.summary(started.elapsed());
        tracing::info!(
            events = summary.events_processed,
            total_kwh = summary.total_kwh(),
            "simulation finished"
        );
        Ok(summary)
    }

    /// Summary of the run so far.
    pub fn summary(&self, wall_time: Duration) -> SimulationSummary {
        let cluster = &self.state.cluster;
        let hosts = cluster
            .servers()
            .iter()
            .map(|server| {
                let machine = server.machine();
                let combined = energy::combine(
                    machine.state_intervals(),
                    server.read_intervals(),
                    server.write_intervals(),
                );
                HostSummary {
                    name: machine.name().to_string(),
                    kwh: self.model.consumption(&combined),
                    transitions: machine.transition_count(),
                    time_per_mode: energy::time_per_mode(&combined),
                    disk_used: server.used(),
                    disk_capacity: server.capacity(),
                    client: self
                        .state
                        .clients
                        .get(server.id().0)
                        .map(FileSystemClient::counters)
                        .unwrap_or_default(),
                }
            })
            .collect();

        SimulationSummary {
            seed: self.seed,
            span: Interval::new(self.world.start(), self.world.now().max(self.world.start())),
            wall_time,
            events_processed: self.world.events_processed(),
            hosts,
            metadata: self.state.metadata.counters(),
            files: self.state.metadata.file_count(),
            min_free_space: cluster.watermark().minimum(),
            malformed_trace_lines: self.malformed.iter().map(MalformedLines::get).sum(),
        }
    }
}
