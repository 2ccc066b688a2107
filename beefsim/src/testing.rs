//! Fixtures shared by unit tests.

use std::time::Duration;

use beefsim_kernel::{Instant, SimWorld};

use crate::cluster::Cluster;
use crate::events::SimEvent;
use crate::machine::{HostId, Machine, PowerState};

pub(crate) const TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub(crate) const TD: Duration = Duration::from_millis(2500);

/// A cluster whose hosts are all idle from genesis for a minute.
pub(crate) fn idle_cluster(world: &SimWorld<SimEvent>, capacities: &[u64]) -> Cluster {
    let mut cluster = Cluster::new();
    for (i, capacity) in capacities.iter().enumerate() {
        let id = cluster.add_host(format!("host{i}"), *capacity, TIMEOUT, TD, world.downgrade());
        cluster
            .machine_mut(id)
            .set_idle(Instant::GENESIS, Duration::from_secs(60))
            .expect("bootstrap accepts idleness");
    }
    cluster
}

/// Replaces host `id` with a fresh machine that fell asleep at `asleep_at`
/// and would sleep for `sleep`.
pub(crate) fn put_to_sleep(
    cluster: &mut Cluster,
    world: &SimWorld<SimEvent>,
    id: HostId,
    asleep_at: Instant,
    sleep: Duration,
) {
    let idle_begin = asleep_at - TD - TIMEOUT;
    let machine = cluster.machine_mut(id);
    *machine = Machine::new(id, machine.name().to_string(), TIMEOUT, TD, world.downgrade());
    machine
        .set_idle(idle_begin, TIMEOUT + TD + sleep)
        .expect("idle");
    machine
        .set_sleeping(idle_begin + TIMEOUT, TD + sleep)
        .expect("going to sleep");
    machine.set_sleeping(asleep_at, sleep).expect("sleeping");
    assert_eq!(machine.state(), PowerState::Sleeping);
}
