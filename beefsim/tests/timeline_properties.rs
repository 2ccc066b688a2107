use std::collections::VecDeque;
use std::time::Duration;

use beefsim::{HostId, PowerState, SimEvent, SimulationBuilder, UserActivity, UserIdleness};
use beefsim_kernel::{EventSource, Instant, SimulationResult};
use proptest::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(600);

/// Alternating user periods, starting with idleness at genesis.
struct Periods {
    host: HostId,
    next_begin: Instant,
    idle_next: bool,
    lengths: VecDeque<u64>,
}

impl EventSource<SimEvent> for Periods {
    fn next_event(&mut self) -> SimulationResult<Option<(Instant, SimEvent)>> {
        let Some(secs) = self.lengths.pop_front() else {
            return Ok(None);
        };
        let duration = Duration::from_secs(secs);
        let event = if self.idle_next {
            SimEvent::UserIdleness(UserIdleness {
                host: self.host,
                duration,
                delayable: true,
            })
        } else {
            SimEvent::UserActivity(UserActivity {
                host: self.host,
                duration,
                delayable: true,
            })
        };
        let begin = self.next_begin;
        self.next_begin = begin + duration;
        self.idle_next = !self.idle_next;
        Ok(Some((begin, event)))
    }
}

// Whole seconds keep trace boundaries off the half-second transition ends.
fn periods() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..2 * TIMEOUT.as_secs(), 1..24)
}

// With a whole-second transition, idleness can end exactly when a sleep
// transition does.
fn periods_around_the_transition() -> impl Strategy<Value = Vec<u64>> {
    let timeout = TIMEOUT.as_secs();
    let length = prop_oneof![
        Just(timeout + 1),
        Just(timeout + 2),
        Just(timeout + 3),
        1u64..timeout,
    ];
    prop::collection::vec(length, 1..24)
}

fn check_timeline(lengths: Vec<u64>, transition: Duration) -> Result<(), TestCaseError> {
    let mut sim = SimulationBuilder::new()
        .host("jurupoca", 1 << 30)
        .sleep_timeout(TIMEOUT)
        .transition_duration(transition)
        .seed(3)
        .build()
        .unwrap();
    let idle_lengths: Vec<u64> = lengths.iter().step_by(2).copied().collect();
    sim.add_source(Periods {
        host: HostId(0),
        next_begin: Instant::GENESIS,
        idle_next: true,
        lengths: lengths.into(),
    })
    .unwrap();

    let summary = sim.run().unwrap();
    let machine = sim.state().cluster().machine(HostId(0));
    let timeline = machine.state_intervals();

    prop_assert_eq!(timeline[0].interval.begin(), Instant::GENESIS);
    for pair in timeline.windows(2) {
        prop_assert_eq!(pair[0].interval.end(), pair[1].interval.begin());
    }
    prop_assert!(timeline.iter().all(|logged| logged.state != PowerState::Bootstrap));

    // every sleep comes with exactly one way in and one way out, except a trailing one
    let sleeps = machine.intervals_in(PowerState::Sleeping).len();
    let going = machine.intervals_in(PowerState::GoingSleep).len();
    let waking = machine.intervals_in(PowerState::WakingUp).len();
    prop_assert_eq!(going, sleeps);
    prop_assert!(waking == sleeps || waking + 1 == sleeps);
    prop_assert_eq!(summary.hosts[0].transitions, going + waking);

    if idle_lengths.iter().all(|secs| *secs <= TIMEOUT.as_secs()) {
        prop_assert_eq!(summary.hosts[0].transitions, 0);
        prop_assert_eq!(machine.current_delay(), Duration::ZERO);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn machine_timeline_is_a_gapless_partition(lengths in periods()) {
        check_timeline(lengths, Duration::from_millis(2500))?;
    }

    #[test]
    fn idleness_ending_with_the_sleep_transition_keeps_the_timeline(
        lengths in periods_around_the_transition()
    ) {
        check_timeline(lengths, Duration::from_secs(2))?;
    }
}
