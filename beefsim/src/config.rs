//! Simulation configuration, loaded from TOML.
//!
//! ```toml
//! traces_dir = "traces"
//! placement = "co-random"
//! replicator = "kind"
//! sleep_timeout_secs = 900
//! transition_duration_ms = 2500
//! replication_level = 2
//! time_to_coherence_secs = 60
//! wake_on_lan = true
//! simulation_start_secs = 1262304000
//! default_free_space = 10737418240
//! seed = 42
//!
//! [free_space]
//! jurupoca = 5368709120
//!
//! [power]
//! active_watts = 140.0
//! sleeping_watts = 3.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beefsim_kernel::Instant;
use serde::Deserialize;

use crate::energy::PowerProfile;
use crate::error::ConfigError;
use crate::placement::PlacementKind;
use crate::replication::ReplicatorKind;

/// Every knob of a simulation run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Directory holding the `idleness-<host>` and `fs-<host>` traces.
    pub traces_dir: PathBuf,
    /// Data placement name: `random` or `co-random`.
    pub placement: String,
    /// Replicator name: `faithful`, `kind`, `noop` or `never-migrate`.
    pub replicator: String,
    /// Idle time before a machine goes to sleep.
    pub sleep_timeout_secs: u64,
    /// Length of each sleep/wake transition.
    pub transition_duration_ms: u64,
    /// Secondaries per file.
    pub replication_level: usize,
    /// Debounce delay between a close and the replica update.
    pub time_to_coherence_secs: u64,
    /// Whether clients wake sleeping data servers.
    pub wake_on_lan: bool,
    /// Simulation start, in seconds since the trace epoch.
    pub simulation_start_secs: u64,
    /// Simulation end, in seconds since the trace epoch; unbounded when absent.
    pub simulation_end_secs: Option<u64>,
    /// Disk capacity of hosts missing from `free_space`, in bytes.
    pub default_free_space: u64,
    /// Per-host disk capacity, in bytes.
    pub free_space: BTreeMap<String, u64>,
    /// Seed for placement draws; derived from the wall clock when absent.
    pub seed: Option<u64>,
    /// Period of the aggregate free-space log; disabled when absent.
    pub space_log_interval_secs: Option<u64>,
    /// Power draw per state for the energy model.
    pub power: PowerProfile,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            traces_dir: PathBuf::from("traces"),
            placement: PlacementKind::CoLocatedRandom.to_string(),
            replicator: ReplicatorKind::Faithful.to_string(),
            sleep_timeout_secs: 15 * 60,
            transition_duration_ms: 2500,
            replication_level: 2,
            time_to_coherence_secs: 60,
            wake_on_lan: true,
            simulation_start_secs: 0,
            simulation_end_secs: None,
            default_free_space: 10 * 1024 * 1024 * 1024,
            free_space: BTreeMap::new(),
            seed: None,
            space_log_interval_secs: None,
            power: PowerProfile::default(),
        }
    }
}

impl SimulationConfig {
    /// Reads and validates the configuration file at `path`.
    ///
    /// A relative `traces_dir` is resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&contents)?;
        if config.traces_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.traces_dir = parent.join(&config.traces_dir);
            }
        }
        tracing::debug!(path = %path.display(), traces_dir = %config.traces_dir.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks names and ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.placement_kind()?;
        self.replicator_kind()?;
        if self.sleep_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sleep_timeout_secs must be positive".to_string(),
            ));
        }
        if self.time_to_coherence_secs == 0 {
            return Err(ConfigError::Invalid(
                "time_to_coherence_secs must be positive".to_string(),
            ));
        }
        if let Some(end) = self.simulation_end_secs {
            if end <= self.simulation_start_secs {
                return Err(ConfigError::Invalid(format!(
                    "simulation_end_secs ({end}) must be after simulation_start_secs ({})",
                    self.simulation_start_secs
                )));
            }
        }
        if self.space_log_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "space_log_interval_secs must be positive".to_string(),
            ));
        }
        let p = &self.power;
        let watts = [
            p.active_watts,
            p.idle_watts,
            p.sleeping_watts,
            p.transitioning_watts,
            p.reading_watts,
            p.writing_watts,
        ];
        if watts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "power draws must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved data placement.
    pub fn placement_kind(&self) -> Result<PlacementKind, ConfigError> {
        self.placement.parse()
    }

    /// Resolved replicator.
    pub fn replicator_kind(&self) -> Result<ReplicatorKind, ConfigError> {
        self.replicator.parse()
    }

    /// Idle time before sleeping.
    pub fn sleep_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_timeout_secs)
    }

    /// Sleep/wake transition length.
    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_duration_ms)
    }

    /// Replica update debounce.
    pub fn time_to_coherence(&self) -> Duration {
        Duration::from_secs(self.time_to_coherence_secs)
    }

    /// First simulated instant.
    pub fn start(&self) -> Instant {
        Instant::from_secs(self.simulation_start_secs)
    }

    /// Last simulated instant.
    pub fn end(&self) -> Instant {
        self.simulation_end_secs
            .map_or(Instant::END_OF_TIME, Instant::from_secs)
    }

    /// Disk capacity of `host`.
    pub fn free_space_for(&self, host: &str) -> u64 {
        self.free_space
            .get(host)
            .copied()
            .unwrap_or(self.default_free_space)
    }
}
