//! Energy accounting over a host's timeline.
//!
//! A machine's logged power states are refined with the periods during which
//! its data server served reads or writes, then priced by an
//! [`EnergyConsumptionModel`].

use std::fmt;
use std::time::Duration;

use beefsim_kernel::{merge_all, Interval};
use serde::Deserialize;

use crate::machine::{PowerState, StateInterval};

/// Coarse power mode of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerMode {
    /// In use.
    Active,
    /// Powered on, unused.
    Idle,
    /// Suspended.
    Sleeping,
    /// Going to sleep or waking up.
    Transitioning,
}

/// Power mode refined with the I/O happening at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnergyState {
    /// Underlying power mode.
    pub mode: PowerMode,
    /// The data server was serving reads.
    pub reading: bool,
    /// The data server was serving writes.
    pub writing: bool,
}

impl EnergyState {
    /// Energy state of a logged power state; `None` for bootstrap.
    pub fn from_power_state(state: PowerState) -> Option<Self> {
        let mode = match state {
            PowerState::Bootstrap => return None,
            PowerState::Active => PowerMode::Active,
            PowerState::Idle => PowerMode::Idle,
            PowerState::Sleeping => PowerMode::Sleeping,
            PowerState::GoingSleep | PowerState::WakingUp => PowerMode::Transitioning,
        };
        Some(Self {
            mode,
            reading: false,
            writing: false,
        })
    }

    /// Same state, with reads going on.
    pub fn with_read(self) -> Self {
        Self {
            reading: true,
            ..self
        }
    }

    /// Same state, with writes going on.
    pub fn with_write(self) -> Self {
        Self {
            writing: true,
            ..self
        }
    }
}

impl fmt::Display for EnergyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            PowerMode::Active => "active",
            PowerMode::Idle => "idle",
            PowerMode::Sleeping => "sleeping",
            PowerMode::Transitioning => "transitioning",
        };
        f.write_str(mode)?;
        if self.reading {
            f.write_str("+read")?;
        }
        if self.writing {
            f.write_str("+write")?;
        }
        Ok(())
    }
}

/// An energy state held over an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyStateInterval {
    /// The state.
    pub state: EnergyState,
    /// When it held.
    pub interval: Interval,
}

impl fmt::Display for EnergyStateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} - {}>", self.state, self.interval)
    }
}

/// Combines a machine's power states with its read and write periods.
///
/// The output covers the same instants as `states`, split wherever an I/O
/// period starts or ends.
pub fn combine(
    states: &[StateInterval],
    reads: &[Interval],
    writes: &[Interval],
) -> Vec<EnergyStateInterval> {
    let converted = states
        .iter()
        .filter_map(|logged| {
            EnergyState::from_power_state(logged.state).map(|state| EnergyStateInterval {
                state,
                interval: logged.interval,
            })
        })
        .collect();
    let with_writes = overlay(converted, writes, EnergyState::with_write);
    overlay(with_writes, reads, EnergyState::with_read)
}

fn overlay(
    intervals: Vec<EnergyStateInterval>,
    operations: &[Interval],
    refine: fn(EnergyState) -> EnergyState,
) -> Vec<EnergyStateInterval> {
    let mut operations = merge_all(operations.to_vec());
    operations.retain(|op| !op.is_empty());

    let mut combined = Vec::with_capacity(intervals.len());
    let mut first_candidate = 0;
    for EnergyStateInterval { state, interval } in intervals {
        while operations
            .get(first_candidate)
            .is_some_and(|op| op.end() <= interval.begin())
        {
            first_candidate += 1;
        }

        let mut next = first_candidate;
        let mut rest = Some(interval);
        while let Some(current) = rest {
            let Some(op) = operations.get(next).filter(|op| op.overlaps(&current)) else {
                combined.push(EnergyStateInterval {
                    state,
                    interval: current,
                });
                break;
            };
            let (before, after) = current.difference(op);
            if let Some(before) = before {
                combined.push(EnergyStateInterval {
                    state,
                    interval: before,
                });
            }
            if let Some(during) = current.intersection(op) {
                combined.push(EnergyStateInterval {
                    state: refine(state),
                    interval: during,
                });
            }
            rest = after;
            next += 1;
        }
    }
    combined
}

/// Prices a timeline of energy states.
pub trait EnergyConsumptionModel: fmt::Debug {
    /// Total consumption over `intervals`, in kilowatt-hours.
    fn consumption(&self, intervals: &[EnergyStateInterval]) -> f64;
}

/// Power draw per state, in watts.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PowerProfile {
    /// Draw while in use.
    pub active_watts: f64,
    /// Draw while powered on and unused.
    pub idle_watts: f64,
    /// Draw while suspended.
    pub sleeping_watts: f64,
    /// Draw while going to sleep or waking up.
    pub transitioning_watts: f64,
    /// Extra draw while serving reads.
    pub reading_watts: f64,
    /// Extra draw while serving writes.
    pub writing_watts: f64,
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self {
            active_watts: 140.0,
            idle_watts: 90.0,
            sleeping_watts: 3.0,
            transitioning_watts: 140.0,
            reading_watts: 10.0,
            writing_watts: 12.0,
        }
    }
}

/// Constant draw per state, plus a surcharge while I/O is served.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPowerModel {
    profile: PowerProfile,
}

impl LinearPowerModel {
    /// Model with the given draws.
    pub fn new(profile: PowerProfile) -> Self {
        Self { profile }
    }

    /// Draw in `state`, in watts.
    pub fn watts(&self, state: EnergyState) -> f64 {
        let p = &self.profile;
        let base = match state.mode {
            PowerMode::Active => p.active_watts,
            PowerMode::Idle => p.idle_watts,
            PowerMode::Sleeping => p.sleeping_watts,
            PowerMode::Transitioning => p.transitioning_watts,
        };
        let mut watts = base;
        if state.reading {
            watts += p.reading_watts;
        }
        if state.writing {
            watts += p.writing_watts;
        }
        watts
    }
}

impl EnergyConsumptionModel for LinearPowerModel {
    fn consumption(&self, intervals: &[EnergyStateInterval]) -> f64 {
        let watt_seconds: f64 = intervals
            .iter()
            .map(|held| self.watts(held.state) * held.interval.len().as_secs_f64())
            .sum();
        watt_seconds / 3_600_000.0
    }
}

/// Total time spent in each power mode.
pub fn time_per_mode(intervals: &[EnergyStateInterval]) -> [(PowerMode, Duration); 4] {
    let mut totals = [
        (PowerMode::Active, Duration::ZERO),
        (PowerMode::Idle, Duration::ZERO),
        (PowerMode::Sleeping, Duration::ZERO),
        (PowerMode::Transitioning, Duration::ZERO),
    ];
    for held in intervals {
        if let Some((_, total)) = totals.iter_mut().find(|(mode, _)| *mode == held.state.mode) {
            *total += held.interval.len();
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use beefsim_kernel::Instant;

    use super::*;

    fn iv(begin: u64, end: u64) -> Interval {
        Interval::new(Instant::from_secs(begin), Instant::from_secs(end))
    }

    fn logged(state: PowerState, begin: u64, end: u64) -> StateInterval {
        StateInterval {
            state,
            interval: iv(begin, end),
        }
    }

    fn rendered(intervals: &[EnergyStateInterval]) -> Vec<String> {
        intervals.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn io_periods_split_power_states() {
        let states = [
            logged(PowerState::Idle, 0, 100),
            logged(PowerState::GoingSleep, 100, 110),
            logged(PowerState::Sleeping, 110, 200),
        ];
        let reads = [iv(10, 20), iv(15, 30), iv(95, 105)];
        let writes = [iv(25, 40)];

        let combined = combine(&states, &reads, &writes);

        let s = |b: u64| Instant::from_secs(b);
        assert_eq!(
            rendered(&combined),
            vec![
                format!("<idle - [{}, {})>", s(0), s(10)),
                format!("<idle+read - [{}, {})>", s(10), s(25)),
                format!("<idle+read+write - [{}, {})>", s(25), s(30)),
                format!("<idle+write - [{}, {})>", s(30), s(40)),
                format!("<idle - [{}, {})>", s(40), s(95)),
                format!("<idle+read - [{}, {})>", s(95), s(100)),
                format!("<transitioning+read - [{}, {})>", s(100), s(105)),
                format!("<transitioning - [{}, {})>", s(105), s(110)),
                format!("<sleeping - [{}, {})>", s(110), s(200)),
            ]
        );
        let covered: Duration = combined.iter().map(|held| held.interval.len()).sum();
        assert_eq!(covered, Duration::from_secs(200));
    }

    #[test]
    fn linear_model_reports_kilowatt_hours() {
        let model = LinearPowerModel::new(PowerProfile {
            active_watts: 100.0,
            idle_watts: 50.0,
            sleeping_watts: 0.0,
            transitioning_watts: 100.0,
            reading_watts: 0.0,
            writing_watts: 0.0,
        });
        let states = [
            logged(PowerState::Active, 0, 3600),
            logged(PowerState::Idle, 3600, 7200),
            logged(PowerState::Sleeping, 7200, 10800),
        ];
        let kwh = model.consumption(&combine(&states, &[], &[]));
        assert!((kwh - 0.15).abs() < 1e-9);
    }

    #[test]
    fn time_is_totalled_per_mode() {
        let states = [
            logged(PowerState::Idle, 0, 900),
            logged(PowerState::GoingSleep, 900, 905),
            logged(PowerState::Sleeping, 905, 1000),
            logged(PowerState::WakingUp, 1000, 1005),
        ];
        let totals = time_per_mode(&combine(&states, &[], &[]));
        assert_eq!(totals[1], (PowerMode::Idle, Duration::from_secs(900)));
        assert_eq!(totals[3], (PowerMode::Transitioning, Duration::from_secs(10)));
    }
}
