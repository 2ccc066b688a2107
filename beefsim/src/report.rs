//! End-of-run summary.

use std::fmt;
use std::time::Duration;

use beefsim_kernel::Interval;

use crate::client::ClientCounters;
use crate::energy::PowerMode;
use crate::metadata::MetadataCounters;

/// What happened on one host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSummary {
    /// Host name.
    pub name: String,
    /// Energy consumed, in kilowatt-hours.
    pub kwh: f64,
    /// Going-to-sleep and waking-up transitions.
    pub transitions: usize,
    /// Time spent in each power mode.
    pub time_per_mode: [(PowerMode, Duration); 4],
    /// Bytes stored on the data server at the end of the run.
    pub disk_used: u64,
    /// Disk capacity of the data server.
    pub disk_capacity: u64,
    /// Counters of the client running on the host.
    pub client: ClientCounters,
}

/// Report of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    /// Seed the placement draws were made with.
    pub seed: u64,
    /// Simulated span, from the start instant to the last dispatched event.
    pub span: Interval,
    /// Wall-clock time taken by the run.
    pub wall_time: Duration,
    /// Events dispatched.
    pub events_processed: u64,
    /// Per-host results, in host order.
    pub hosts: Vec<HostSummary>,
    /// Metadata server counters.
    pub metadata: MetadataCounters,
    /// Files left in the namespace.
    pub files: usize,
    /// Lowest aggregate free space observed, `None` if no disk ever changed.
    pub min_free_space: Option<u64>,
    /// File-system trace lines skipped as malformed.
    pub malformed_trace_lines: u64,
}

impl SimulationSummary {
    /// Energy consumed by the whole cluster, in kilowatt-hours.
    pub fn total_kwh(&self) -> f64 {
        self.hosts.iter().map(|host| host.kwh).sum()
    }

    /// Client counters summed over every host.
    pub fn client_totals(&self) -> ClientCounters {
        let mut totals = ClientCounters::default();
        for host in &self.hosts {
            totals.accumulate(&host.client);
        }
        totals
    }

    /// Transitions summed over every host.
    pub fn total_transitions(&self) -> usize {
        self.hosts.iter().map(|host| host.transitions).sum()
    }
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Summary ===")?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f, "Simulated Span: {} ({:?})", self.span, self.span.len())?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;
        writeln!(f, "Events Processed: {}", self.events_processed)?;
        writeln!(f)?;

        for host in &self.hosts {
            writeln!(f, "{}", host.name)?;
            writeln!(f, "  {:.6} kWh", host.kwh)?;
            writeln!(f, "  {} transitions", host.transitions)?;
            for (mode, time) in &host.time_per_mode {
                writeln!(f, "  {:?}: {:?}", mode, time)?;
            }
            writeln!(
                f,
                "  Disk: {} / {} bytes",
                host.disk_used, host.disk_capacity
            )?;
            let c = &host.client;
            writeln!(
                f,
                "  Reads: {} served, {} while client asleep, {} while data server asleep",
                c.reads, c.reads_while_client_asleep, c.reads_while_data_server_asleep
            )?;
            writeln!(
                f,
                "  Writes: {} served, {} while client asleep, {} while data server asleep",
                c.writes, c.writes_while_client_asleep, c.writes_while_data_server_asleep
            )?;
            writeln!(f, "  Re-submitted after wake-on-lan: {}", c.resubmitted)?;
            writeln!(f, "  Promotions: {}", c.promotions)?;
            writeln!(
                f,
                "  Disk-full writes: {} ({} bytes not written)",
                c.disk_full_writes, c.bytes_not_written
            )?;
            writeln!(f, "======================")?;
        }

        writeln!(f)?;
        writeln!(f, "Cluster:")?;
        writeln!(f, "  Total Energy: {:.6} kWh", self.total_kwh())?;
        writeln!(f, "  Total Transitions: {}", self.total_transitions())?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Placement Failures: {}", self.metadata.placement_failures)?;
        writeln!(f, "  Replica Updates: {}", self.metadata.replica_updates)?;
        writeln!(f, "  Replicas Relocated: {}", self.metadata.relocations)?;
        writeln!(f, "  Wake-on-lan by Replicator: {}", self.metadata.wakeups)?;
        writeln!(f, "  Capacity Exhaustions: {}", self.metadata.capacity_exhaustions)?;
        match self.min_free_space {
            Some(bytes) => writeln!(f, "  Minimum Free Space: {} bytes", bytes)?,
            None => writeln!(f, "  Minimum Free Space: n/a")?,
        }
        writeln!(f, "  Malformed Trace Lines: {}", self.malformed_trace_lines)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use beefsim_kernel::Instant;

    use super::*;

    fn host(name: &str, kwh: f64, transitions: usize, reads: u64) -> HostSummary {
        HostSummary {
            name: name.to_string(),
            kwh,
            transitions,
            time_per_mode: [
                (PowerMode::Active, Duration::ZERO),
                (PowerMode::Idle, Duration::from_secs(60)),
                (PowerMode::Sleeping, Duration::ZERO),
                (PowerMode::Transitioning, Duration::ZERO),
            ],
            disk_used: 0,
            disk_capacity: 100,
            client: ClientCounters {
                reads,
                ..ClientCounters::default()
            },
        }
    }

    #[test]
    fn totals_and_rendering() {
        let summary = SimulationSummary {
            seed: 42,
            span: Interval::new(Instant::GENESIS, Instant::from_secs(60)),
            wall_time: Duration::from_millis(3),
            events_processed: 7,
            hosts: vec![host("jurupoca", 0.5, 2, 3), host("cherne", 0.25, 0, 4)],
            metadata: MetadataCounters::default(),
            files: 1,
            min_free_space: None,
            malformed_trace_lines: 0,
        };

        assert!((summary.total_kwh() - 0.75).abs() < 1e-12);
        assert_eq!(summary.total_transitions(), 2);
        assert_eq!(summary.client_totals().reads, 7);

        let text = summary.to_string();
        assert!(text.starts_with("=== Simulation Summary ===\nSeed: 42\n"));
        assert!(text.contains("jurupoca\n  0.500000 kWh\n  2 transitions\n"));
        assert!(text.contains("Minimum Free Space: n/a"));
    }
}
