use beefsim_kernel::{
    EventHandler, EventSource, Instant, SimWorld, SimulationError, SimulationResult, WeakSimWorld,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Timer {
    Fire { task_id: u32 },
    Rearm { task_id: u32, remaining: u32 },
}

struct Collector {
    world: WeakSimWorld<Timer>,
    fired: Vec<(Instant, u32)>,
}

impl EventHandler<Timer> for Collector {
    type Error = SimulationError;

    fn handle(&mut self, now: Instant, event: Timer) -> SimulationResult<()> {
        match event {
            Timer::Fire { task_id } => self.fired.push((now, task_id)),
            Timer::Rearm { task_id, remaining } => {
                self.fired.push((now, task_id));
                if remaining > 0 {
                    self.world.schedule_after(
                        Duration::from_millis(30),
                        Timer::Rearm {
                            task_id,
                            remaining: remaining - 1,
                        },
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn run_simulation() -> Vec<(Instant, u32)> {
    let world = SimWorld::new();
    let mut collector = Collector {
        world: world.downgrade(),
        fired: Vec::new(),
    };

    world
        .schedule_at(Instant::from_millis(100), Timer::Fire { task_id: 1 })
        .unwrap();
    world
        .schedule_at(Instant::from_millis(50), Timer::Fire { task_id: 2 })
        .unwrap();
    world
        .schedule_at(Instant::from_millis(100), Timer::Fire { task_id: 3 })
        .unwrap();
    world
        .schedule_at(
            Instant::from_millis(40),
            Timer::Rearm {
                task_id: 4,
                remaining: 2,
            },
        )
        .unwrap();
    world
        .schedule_at(Instant::from_millis(100), Timer::Fire { task_id: 5 })
        .unwrap();

    world.run(&mut collector).unwrap();
    collector.fired
}

#[test]
fn deterministic_event_execution_order() {
    let results: Vec<Vec<(Instant, u32)>> = (0..10).map(|_| run_simulation()).collect();

    let first_result = &results[0];
    for (i, result) in results.iter().enumerate().skip(1) {
        assert_eq!(
            result,
            first_result,
            "Run {} produced a different dispatch order than the first run",
            i + 1
        );
    }

    let expected = vec![
        (Instant::from_millis(40), 4),
        (Instant::from_millis(50), 2),
        (Instant::from_millis(70), 4),
        (Instant::from_millis(100), 1),
        (Instant::from_millis(100), 3),
        (Instant::from_millis(100), 5),
        // rearmed at t=70, queued after the three submitted up front
        (Instant::from_millis(100), 4),
    ];
    assert_eq!(first_result, &expected);
}

#[test]
fn clock_never_moves_backwards() {
    let fired = run_simulation();
    assert!(fired.windows(2).all(|pair| pair[0].0 <= pair[1].0));
}

/// A source replaying a fixed list, the way trace readers feed the world.
struct Replay {
    entries: std::vec::IntoIter<(u64, u32)>,
}

impl EventSource<Timer> for Replay {
    fn next_event(&mut self) -> SimulationResult<Option<(Instant, Timer)>> {
        Ok(self
            .entries
            .next()
            .map(|(millis, task_id)| (Instant::from_millis(millis), Timer::Fire { task_id })))
    }
}

#[test]
fn sources_interleave_by_time() {
    let world = SimWorld::new();
    let mut collector = Collector {
        world: world.downgrade(),
        fired: Vec::new(),
    };

    world
        .add_source(Replay {
            entries: vec![(10, 1), (30, 1), (50, 1)].into_iter(),
        })
        .unwrap();
    world
        .add_source(Replay {
            entries: vec![(20, 2), (30, 2), (40, 2)].into_iter(),
        })
        .unwrap();

    // one pending event per source
    assert_eq!(world.pending_event_count(), 2);

    world.run(&mut collector).unwrap();
    let order: Vec<u32> = collector.fired.iter().map(|(_, id)| *id).collect();
    assert_eq!(order, vec![1, 2, 1, 2, 2, 1]);
}

#[test]
fn pending_events_snapshot_is_in_dispatch_order() {
    let world: SimWorld<Timer> = SimWorld::new();
    world
        .schedule_at(Instant::from_secs(3), Timer::Fire { task_id: 3 })
        .unwrap();
    let cancelled = world
        .schedule_at(Instant::from_secs(1), Timer::Fire { task_id: 1 })
        .unwrap();
    world
        .schedule_at(Instant::from_secs(2), Timer::Fire { task_id: 2 })
        .unwrap();
    world.cancel(cancelled);

    let snapshot = world.pending_events();
    assert_eq!(
        snapshot,
        vec![
            (Instant::from_secs(2), Timer::Fire { task_id: 2 }),
            (Instant::from_secs(3), Timer::Fire { task_id: 3 }),
        ]
    );
}
