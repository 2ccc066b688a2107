//! Per-host power-state machine.
//!
//! A [`Machine`] replays its owner's activity trace and decides when it falls
//! asleep, how long transitions take and how far they push the rest of the
//! host's events back. Every period it spends in a state is logged, gapless,
//! in [`Machine::state_intervals`].

use std::fmt;
use std::time::Duration;

use beefsim_kernel::{Instant, Interval, WeakSimWorld};

use crate::error::MachineError;
use crate::events::{SimEvent, Sleep, UserActivity, UserIdleness, WakeOnLan};

/// Index of a host in the cluster. Machines, data servers and clients share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(pub usize);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

/// Observable power state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// Before the first trace period.
    Bootstrap,
    /// Powered on, nobody using it.
    Idle,
    /// Powered on and in use.
    Active,
    /// Suspended.
    Sleeping,
    /// Transitioning from idle to sleeping.
    GoingSleep,
    /// Transitioning from sleeping to idle or active.
    WakingUp,
}

impl PowerState {
    /// Returns `true` for the two transition states.
    pub fn is_transition(self) -> bool {
        matches!(self, PowerState::GoingSleep | PowerState::WakingUp)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerState::Bootstrap => "bootstrap",
            PowerState::Idle => "idle",
            PowerState::Active => "active",
            PowerState::Sleeping => "sleeping",
            PowerState::GoingSleep => "going to sleep",
            PowerState::WakingUp => "waking up",
        };
        f.write_str(name)
    }
}

/// One logged period of a machine's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInterval {
    /// State occupied.
    pub state: PowerState,
    /// When.
    pub interval: Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineState {
    Bootstrap,
    Idle {
        since: Instant,
        sleep_expected: bool,
    },
    Active {
        since: Instant,
    },
    Sleeping {
        since: Instant,
    },
    GoingSleep {
        since: Instant,
        transition_end: Instant,
        wake_scheduled: bool,
    },
    WakingUp {
        transition: Interval,
        expect_idle: bool,
        delay_increment: Duration,
        early_activity: bool,
    },
}

impl MachineState {
    fn power_state(&self) -> PowerState {
        match self {
            MachineState::Bootstrap => PowerState::Bootstrap,
            MachineState::Idle { .. } => PowerState::Idle,
            MachineState::Active { .. } => PowerState::Active,
            MachineState::Sleeping { .. } => PowerState::Sleeping,
            MachineState::GoingSleep { .. } => PowerState::GoingSleep,
            MachineState::WakingUp { .. } => PowerState::WakingUp,
        }
    }
}

/// A simulated host's power behaviour.
#[derive(Debug)]
pub struct Machine {
    id: HostId,
    name: String,
    sleep_timeout: Duration,
    transition_duration: Duration,
    state: MachineState,
    state_intervals: Vec<StateInterval>,
    current_delay: Duration,
    world: WeakSimWorld<SimEvent>,
}

impl Machine {
    /// Creates a machine in [`PowerState::Bootstrap`].
    pub fn new(
        id: HostId,
        name: impl Into<String>,
        sleep_timeout: Duration,
        transition_duration: Duration,
        world: WeakSimWorld<SimEvent>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            sleep_timeout,
            transition_duration,
            state: MachineState::Bootstrap,
            state_intervals: Vec::new(),
            current_delay: Duration::ZERO,
            world,
        }
    }

    /// Host index.
    pub fn id(&self) -> HostId {
        self.id
    }

    /// Host name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idle time after which the machine goes to sleep.
    pub fn sleep_timeout(&self) -> Duration {
        self.sleep_timeout
    }

    /// Length of a sleep or wake-up transition.
    pub fn transition_duration(&self) -> Duration {
        self.transition_duration
    }

    /// Current power state.
    pub fn state(&self) -> PowerState {
        self.state.power_state()
    }

    /// Every period logged so far, in order.
    pub fn state_intervals(&self) -> &[StateInterval] {
        &self.state_intervals
    }

    /// Logged intervals spent in `state`.
    pub fn intervals_in(&self, state: PowerState) -> Vec<Interval> {
        self.state_intervals
            .iter()
            .filter(|logged| logged.state == state)
            .map(|logged| logged.interval)
            .collect()
    }

    /// Number of logged sleep and wake-up transitions.
    pub fn transition_count(&self) -> usize {
        self.state_intervals
            .iter()
            .filter(|logged| logged.state.is_transition())
            .count()
    }

    /// `true` when the machine is [`Active`](PowerState::Active) or [`Idle`](PowerState::Idle).
    pub fn is_reachable(&self) -> bool {
        matches!(
            self.state,
            MachineState::Active { .. } | MachineState::Idle { .. }
        )
    }

    /// `true` when a wake-on-LAN means something: sleeping or transitioning.
    pub fn can_wake(&self) -> bool {
        matches!(
            self.state,
            MachineState::Sleeping { .. }
                | MachineState::GoingSleep { .. }
                | MachineState::WakingUp { .. }
        )
    }

    /// Sends a wake-on-LAN if the machine is asleep or transitioning.
    ///
    /// Returns whether a signal was sent. Machines still in bootstrap have no
    /// timeline yet and are left alone.
    pub fn wake_if_unreachable(&mut self, now: Instant) -> Result<bool, MachineError> {
        if !self.can_wake() {
            return Ok(false);
        }
        self.wake_on_lan(now)?;
        Ok(true)
    }

    /// Skew accumulated by committed transitions.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Committed delay plus the increment the ongoing wake-up will commit.
    ///
    /// Delayable events targeting this host are shifted by this amount.
    pub fn effective_delay(&self) -> Duration {
        match self.state {
            MachineState::WakingUp {
                delay_increment, ..
            } => self.current_delay + delay_increment,
            _ => self.current_delay,
        }
    }

    /// Begin instant of the interval the current state was entered with.
    pub fn last_transition_time(&self) -> Instant {
        match self.state {
            MachineState::Bootstrap => Instant::GENESIS,
            MachineState::Idle { since, .. }
            | MachineState::Active { since }
            | MachineState::Sleeping { since }
            | MachineState::GoingSleep { since, .. } => since,
            MachineState::WakingUp { transition, .. } => transition.begin(),
        }
    }

    /// User activity for `duration` starting at `begin`.
    pub fn set_active(&mut self, begin: Instant, duration: Duration) -> Result<(), MachineError> {
        self.to_active(Interval::starting_at(begin, duration))
    }

    /// User idleness for `duration` starting at `begin`.
    pub fn set_idle(&mut self, begin: Instant, duration: Duration) -> Result<(), MachineError> {
        self.to_idle(Interval::starting_at(begin, duration))
    }

    /// Sleep step for `duration` starting at `begin`.
    pub fn set_sleeping(&mut self, begin: Instant, duration: Duration) -> Result<(), MachineError> {
        self.to_sleep(Interval::starting_at(begin, duration))
    }

    /// Requests an activity period.
    pub fn to_active(&mut self, interval: Interval) -> Result<(), MachineError> {
        match self.state {
            MachineState::Bootstrap => {
                self.enter_active(interval);
                Ok(())
            }
            MachineState::Idle {
                sleep_expected: true,
                ..
            } => Err(self.unexpected("become active", "a sleep transition is expected")),
            MachineState::Idle { .. } => {
                self.check_continuity(&interval)?;
                self.enter_active(interval);
                Ok(())
            }
            MachineState::Active { .. } => {
                Err(self.unexpected("become active", "it is already active"))
            }
            MachineState::Sleeping { .. } => {
                self.check_continuity(&interval)?;
                self.schedule_user_activity(
                    interval.begin() + self.transition_duration,
                    interval.len(),
                )?;
                self.enter_waking_up(interval.begin(), self.transition_duration, false);
                Ok(())
            }
            MachineState::GoingSleep { transition_end, .. } if interval.begin() == transition_end => {
                // the zero-length sleep step queued on entry has not run yet
                self.schedule_user_activity(interval.begin(), interval.len())?;
                tracing::debug!(
                    host = %self.name,
                    at = %interval.begin(),
                    "activity at the end of the sleep transition requeued behind the sleep step"
                );
                Ok(())
            }
            MachineState::GoingSleep { .. } => {
                Err(self.unexpected("become active", "a transition to sleeping is expected"))
            }
            MachineState::WakingUp {
                expect_idle: true, ..
            } => Err(self.unexpected("become active", "a transition to idle is expected")),
            MachineState::WakingUp {
                transition,
                delay_increment,
                early_activity,
                ..
            } => {
                if transition.contains(interval.begin()) {
                    if early_activity {
                        return Err(MachineError::EarlyActivity {
                            host: self.name.clone(),
                            transition,
                            requested: interval.begin(),
                        });
                    }
                    // the user shows up before the machine is back: start when it is
                    self.schedule_user_activity(transition.end(), interval.len())?;
                    self.state = MachineState::WakingUp {
                        transition,
                        expect_idle: false,
                        delay_increment: transition.end() - interval.begin(),
                        early_activity: true,
                    };
                    tracing::debug!(
                        host = %self.name,
                        requested = %interval.begin(),
                        resumed = %transition.end(),
                        "activity during wake-up rescheduled to transition end"
                    );
                    return Ok(());
                }
                self.check_continuity(&interval)?;
                self.current_delay += delay_increment;
                self.enter_active(interval);
                Ok(())
            }
        }
    }

    /// Requests an idleness period.
    pub fn to_idle(&mut self, interval: Interval) -> Result<(), MachineError> {
        match self.state {
            MachineState::Bootstrap => self.enter_idle(interval),
            MachineState::Active { .. }
            | MachineState::WakingUp {
                expect_idle: true, ..
            } => {
                self.check_continuity(&interval)?;
                self.enter_idle(interval)
            }
            MachineState::Idle { .. } => Err(self.unexpected("become idle", "it is already idle")),
            MachineState::Sleeping { .. } => Err(self.unexpected(
                "become idle",
                "activity or wake-on-lan is expected",
            )),
            MachineState::GoingSleep { .. } => {
                Err(self.unexpected("become idle", "a transition to sleeping is expected"))
            }
            MachineState::WakingUp { .. } => {
                Err(self.unexpected("become idle", "a transition to active is expected"))
            }
        }
    }

    /// Requests a sleep step.
    pub fn to_sleep(&mut self, interval: Interval) -> Result<(), MachineError> {
        match self.state {
            MachineState::Idle {
                sleep_expected: true,
                ..
            } => {
                self.check_continuity(&interval)?;
                let td = self.transition_duration;
                let sleep_duration = interval.len().saturating_sub(td);
                self.schedule(
                    interval.begin() + td,
                    SimEvent::Sleep(Sleep {
                        host: self.id,
                        duration: sleep_duration,
                    }),
                )?;
                let delay_increment = td.saturating_sub(interval.len());
                self.enter_going_sleep(interval.begin(), delay_increment);
                Ok(())
            }
            MachineState::GoingSleep { .. } => {
                self.check_continuity(&interval)?;
                self.enter_sleeping(interval);
                Ok(())
            }
            MachineState::Bootstrap => Err(self.unexpected(
                "go to sleep",
                "traces must start with an idle or active period",
            )),
            MachineState::Idle { .. } => {
                Err(self.unexpected("go to sleep", "a transition to active is expected"))
            }
            MachineState::Active { .. } => {
                Err(self.unexpected("go to sleep", "a transition to idle is expected"))
            }
            MachineState::Sleeping { .. } => Err(self.unexpected(
                "go to sleep",
                "activity or wake-on-lan is expected",
            )),
            MachineState::WakingUp { expect_idle, .. } => Err(self.unexpected(
                "go to sleep",
                if expect_idle {
                    "a transition to idle is expected"
                } else {
                    "a transition to active is expected"
                },
            )),
        }
    }

    /// Out-of-band wake-up received at `now`.
    pub fn wake_on_lan(&mut self, now: Instant) -> Result<(), MachineError> {
        match self.state {
            MachineState::Bootstrap => Err(self.unexpected(
                "wake on lan",
                "traces must start with an idle or active period",
            )),
            MachineState::Idle { .. } | MachineState::Active { .. } => {
                Err(self.unexpected("wake on lan", "it is not sleeping"))
            }
            MachineState::GoingSleep {
                wake_scheduled: true,
                ..
            }
            | MachineState::WakingUp { .. } => Ok(()),
            MachineState::GoingSleep {
                since,
                transition_end,
                wake_scheduled: false,
            } => {
                self.schedule(transition_end, SimEvent::WakeOnLan(WakeOnLan { host: self.id }))?;
                self.state = MachineState::GoingSleep {
                    since,
                    transition_end,
                    wake_scheduled: true,
                };
                Ok(())
            }
            MachineState::Sleeping { since } => self.interrupt_sleep(since, now),
        }
    }

    fn interrupt_sleep(&mut self, since: Instant, now: Instant) -> Result<(), MachineError> {
        let scheduled_end = match self.state_intervals.last() {
            Some(last) if last.state == PowerState::Sleeping => last.interval.end(),
            _ => {
                return Err(MachineError::Simulation(
                    beefsim_kernel::SimulationError::InvalidState(format!(
                        "{} is sleeping but its last logged interval is not a sleep period",
                        self.name
                    )),
                ));
            }
        };
        if scheduled_end < now {
            return Err(MachineError::AlreadyAwake {
                host: self.name.clone(),
                scheduled_end,
                now,
            });
        }

        // the machine only slept until now
        self.state_intervals.pop();
        self.state_intervals.push(StateInterval {
            state: PowerState::Sleeping,
            interval: Interval::new(since, now),
        });

        let td = self.transition_duration;
        let remaining = scheduled_end - now;
        let idleness = remaining.saturating_sub(td);
        tracing::debug!(
            host = %self.name,
            %now,
            remaining = ?remaining,
            "wake-on-lan interrupts sleep"
        );

        if idleness.is_zero() {
            self.enter_waking_up(now, td - remaining, false);
        } else {
            self.schedule(
                now + td,
                SimEvent::UserIdleness(UserIdleness {
                    host: self.id,
                    duration: idleness,
                    delayable: false,
                }),
            )?;
            self.enter_waking_up(now, Duration::ZERO, true);
        }
        Ok(())
    }

    fn enter_idle(&mut self, interval: Interval) -> Result<(), MachineError> {
        let mut logged = interval;
        let mut sleep_expected = false;
        if interval.len() > self.sleep_timeout {
            let sleep_begin = interval.begin() + self.sleep_timeout;
            self.schedule(
                sleep_begin,
                SimEvent::Sleep(Sleep {
                    host: self.id,
                    duration: interval.end() - sleep_begin,
                }),
            )?;
            sleep_expected = true;
            logged = Interval::new(interval.begin(), sleep_begin);
        }
        self.log(PowerState::Idle, logged);
        self.state = MachineState::Idle {
            since: interval.begin(),
            sleep_expected,
        };
        Ok(())
    }

    fn enter_active(&mut self, interval: Interval) {
        self.log(PowerState::Active, interval);
        self.state = MachineState::Active {
            since: interval.begin(),
        };
    }

    fn enter_sleeping(&mut self, interval: Interval) {
        self.log(PowerState::Sleeping, interval);
        self.state = MachineState::Sleeping {
            since: interval.begin(),
        };
    }

    fn enter_going_sleep(&mut self, begin: Instant, delay_increment: Duration) {
        let transition = Interval::starting_at(begin, self.transition_duration);
        self.log(PowerState::GoingSleep, transition);
        self.current_delay += delay_increment;
        self.state = MachineState::GoingSleep {
            since: begin,
            transition_end: transition.end(),
            wake_scheduled: false,
        };
    }

    fn enter_waking_up(&mut self, begin: Instant, delay_increment: Duration, expect_idle: bool) {
        let transition = Interval::starting_at(begin, self.transition_duration);
        self.log(PowerState::WakingUp, transition);
        self.state = MachineState::WakingUp {
            transition,
            expect_idle,
            delay_increment,
            early_activity: false,
        };
    }

    fn log(&mut self, state: PowerState, interval: Interval) {
        tracing::debug!(host = %self.name, %state, %interval, "power state");
        self.state_intervals.push(StateInterval { state, interval });
    }

    fn check_continuity(&self, next: &Interval) -> Result<(), MachineError> {
        match self.state_intervals.last() {
            Some(last) if !last.interval.is_contiguous(next) => Err(MachineError::Discontinuity {
                host: self.name.clone(),
                last: last.interval,
                next: *next,
                delay: self.current_delay,
            }),
            _ => Ok(()),
        }
    }

    fn unexpected(&self, requested: &'static str, expected: &'static str) -> MachineError {
        MachineError::UnexpectedTransition {
            host: self.name.clone(),
            state: self.state(),
            requested,
            expected,
        }
    }

    fn schedule_user_activity(
        &self,
        at: Instant,
        duration: Duration,
    ) -> Result<(), MachineError> {
        self.schedule(
            at,
            SimEvent::UserActivity(UserActivity {
                host: self.id,
                duration,
                delayable: false,
            }),
        )
    }

    fn schedule(&self, at: Instant, event: SimEvent) -> Result<(), MachineError> {
        self.world.schedule_at(at, event)?;
        Ok(())
    }
}
