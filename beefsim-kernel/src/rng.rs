//! Thread-local random number generation for simulation.
//!
//! Placement policies draw from one seeded generator per thread so that a run
//! is fully reproducible from its seed without threading an RNG through every
//! call site.

use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;

thread_local! {
    static SIM_RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::from_entropy());
}

/// Shuffle `items` in place using the thread-local simulation RNG.
///
/// ```rust
/// use beefsim_kernel::{set_sim_seed, sim_shuffle};
///
/// set_sim_seed(42);
/// let mut servers = vec![0, 1, 2, 3];
/// sim_shuffle(&mut servers);
/// servers.sort();
/// assert_eq!(servers, vec![0, 1, 2, 3]);
/// ```
pub fn sim_shuffle<T>(items: &mut [T]) {
    SIM_RNG.with(|rng| items.shuffle(&mut *rng.borrow_mut()));
}

/// Set the seed for the thread-local simulation RNG.
///
/// The same seed always produces the same sequence of draws.
pub fn set_sim_seed(seed: u64) {
    SIM_RNG.with(|rng| {
        *rng.borrow_mut() = ChaCha8Rng::seed_from_u64(seed);
    });
}

/// Reset the thread-local simulation RNG to a fresh, entropy-seeded state.
pub fn reset_sim_rng() {
    SIM_RNG.with(|rng| {
        *rng.borrow_mut() = ChaCha8Rng::from_entropy();
    });
}
