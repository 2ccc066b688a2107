use std::time::Duration;

use beefsim::{
    HostId, PowerState, ReplicatorKind, SimEvent, Simulation, SimulationBuilder, StateInterval,
    UserActivity, UserIdleness, Write,
};
use beefsim_kernel::{Instant, Interval};

const TIMEOUT: Duration = Duration::from_secs(15 * 60);
const TD: Duration = Duration::from_millis(2500);
const MINUTE: Duration = Duration::from_secs(60);

fn cluster(hosts: &[&str]) -> Simulation {
    let mut builder = SimulationBuilder::new()
        .sleep_timeout(TIMEOUT)
        .transition_duration(TD)
        .replication_level(1)
        .replicator(ReplicatorKind::Faithful)
        .seed(42);
    for name in hosts {
        builder = builder.host(*name, 1 << 30);
    }
    builder.build().unwrap()
}

fn idle(host: usize, duration: Duration) -> SimEvent {
    SimEvent::UserIdleness(UserIdleness {
        host: HostId(host),
        duration,
        delayable: true,
    })
}

fn active(host: usize, duration: Duration) -> SimEvent {
    SimEvent::UserActivity(UserActivity {
        host: HostId(host),
        duration,
        delayable: true,
    })
}

fn at(offset: Duration) -> Instant {
    Instant::GENESIS + offset
}

fn logged(state: PowerState, begin: Duration, end: Duration) -> StateInterval {
    StateInterval {
        state,
        interval: Interval::new(at(begin), at(end)),
    }
}

#[test]
fn idleness_past_the_timeout_ends_asleep() {
    let mut sim = cluster(&["jurupoca"]);
    let back = TIMEOUT + MINUTE;
    sim.schedule(Instant::GENESIS, idle(0, back)).unwrap();
    sim.schedule(at(back), active(0, MINUTE)).unwrap();

    while sim.state().cluster().machine(HostId(0)).state() != PowerState::Sleeping {
        assert!(sim.step().unwrap());
    }

    assert_eq!(sim.world().now(), at(TIMEOUT + TD));
    let pending = sim.world().pending_events();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0], (at(back), active(0, MINUTE)));

    let summary = sim.run().unwrap();
    let machine = sim.state().cluster().machine(HostId(0));
    assert_eq!(
        machine.state_intervals(),
        &[
            logged(PowerState::Idle, Duration::ZERO, TIMEOUT),
            logged(PowerState::GoingSleep, TIMEOUT, TIMEOUT + TD),
            logged(PowerState::Sleeping, TIMEOUT + TD, back),
            logged(PowerState::WakingUp, back, back + TD),
            logged(PowerState::Active, back + TD, back + TD + MINUTE),
        ]
    );
    assert_eq!(machine.current_delay(), TD);
    assert_eq!(summary.hosts[0].transitions, 2);
}

#[test]
fn idleness_ending_with_the_sleep_transition_wakes_cleanly() {
    let td = Duration::from_secs(2);
    let mut sim = SimulationBuilder::new()
        .host("jurupoca", 1 << 30)
        .sleep_timeout(TIMEOUT)
        .transition_duration(td)
        .seed(42)
        .build()
        .unwrap();
    let back = TIMEOUT + td;
    sim.schedule(Instant::GENESIS, idle(0, back)).unwrap();
    sim.schedule(at(back), active(0, MINUTE)).unwrap();

    let summary = sim.run().unwrap();

    let machine = sim.state().cluster().machine(HostId(0));
    assert_eq!(
        machine.state_intervals(),
        &[
            logged(PowerState::Idle, Duration::ZERO, TIMEOUT),
            logged(PowerState::GoingSleep, TIMEOUT, back),
            logged(PowerState::Sleeping, back, back),
            logged(PowerState::WakingUp, back, back + td),
            logged(PowerState::Active, back + td, back + td + MINUTE),
        ]
    );
    assert_eq!(machine.current_delay(), td);
    assert_eq!(summary.hosts[0].transitions, 2);
}

#[test]
fn idleness_within_the_timeout_never_sleeps() {
    let mut sim = cluster(&["jurupoca"]);
    sim.schedule(Instant::GENESIS, idle(0, TIMEOUT)).unwrap();
    sim.schedule(at(TIMEOUT), active(0, MINUTE)).unwrap();

    let summary = sim.run().unwrap();
    let machine = sim.state().cluster().machine(HostId(0));
    assert_eq!(machine.state(), PowerState::Active);
    assert_eq!(machine.intervals_in(PowerState::Sleeping), Vec::new());
    assert_eq!(summary.total_transitions(), 0);
}

#[test]
fn write_to_a_sleeping_primary_is_retried_after_wake_up() {
    let mut sim = cluster(&["jurupoca", "cherne"]);
    let back = TIMEOUT + MINUTE;
    let path = "/home/jurupoca/report.odt";
    sim.schedule(Instant::GENESIS, idle(0, back)).unwrap();
    sim.schedule(Instant::GENESIS, active(1, 2 * back)).unwrap();
    sim.schedule(at(back), active(0, MINUTE)).unwrap();

    let write = |client: usize, delayable: bool| {
        SimEvent::Write(Write {
            client: HostId(client),
            path: path.to_string(),
            bytes: 1024,
            file_size: 1024,
            duration: Duration::from_millis(1),
            delayable,
        })
    };
    sim.schedule(at(Duration::from_secs(10)), write(0, true)).unwrap();
    let issued = at(TIMEOUT + Duration::from_secs(30));
    sim.schedule(issued, write(1, true)).unwrap();

    while sim.world().now() < issued {
        assert!(sim.step().unwrap());
    }

    // the replica is stale, so the primary is woken instead of promoted
    assert_eq!(
        sim.state().cluster().machine(HostId(0)).state(),
        PowerState::WakingUp
    );
    let retry_at = issued + TD + Duration::from_secs(1);
    assert!(sim
        .world()
        .pending_events()
        .contains(&(retry_at, write(1, false))));

    let summary = sim.run().unwrap();
    let file = sim.state().metadata().file(path).unwrap();
    assert_eq!(file.primary(), HostId(0));
    assert_eq!(file.bytes_written(), 2048);

    let cherne = &summary.hosts[1].client;
    assert_eq!(cherne.resubmitted, 1);
    assert_eq!(cherne.writes, 1);
    assert_eq!(cherne.promotions, 0);
    assert_eq!(cherne.writes_while_data_server_asleep, 0);

    let jurupoca = sim.state().cluster().machine(HostId(0));
    assert_eq!(
        jurupoca.intervals_in(PowerState::Sleeping),
        vec![Interval::new(at(TIMEOUT + TD), issued)]
    );
    assert_eq!(summary.hosts[0].transitions, 2);
}

#[test]
fn same_seed_same_summary() {
    let run = || {
        let mut sim = cluster(&["jurupoca", "cherne", "pargo"]);
        for host in 0..3 {
            sim.schedule(Instant::GENESIS, idle(host, 20 * MINUTE)).unwrap();
        }
        sim.schedule(
            at(MINUTE),
            SimEvent::Write(Write {
                client: HostId(1),
                path: "/shared/data.bin".to_string(),
                bytes: 1 << 20,
                file_size: 1 << 20,
                duration: Duration::from_millis(40),
                delayable: true,
            }),
        )
        .unwrap();
        let mut summary = sim.run().unwrap();
        summary.wall_time = Duration::ZERO;
        let file = sim.state().metadata().file("/shared/data.bin").unwrap();
        let servers: Vec<HostId> = file.replicas().iter().map(|r| r.server()).collect();
        (summary, file.primary(), servers)
    };

    assert_eq!(run(), run());
}
