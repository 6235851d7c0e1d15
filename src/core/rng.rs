//! Per-worker random number generation.
//!
//! Every worker owns a PCG generator with no shared state, seeded
//! deterministically from a base seed and the worker id so that renders are
//! reproducible for a fixed thread count.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// The per-worker generator.
pub type WorkerRng = Pcg32;

/// Creates the generator for a worker.
///
/// * `base_seed` - Render-wide base seed.
/// * `worker_id` - Worker index.
pub fn worker_rng(base_seed: u64, worker_id: usize) -> WorkerRng {
    let stream = (worker_id as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    Pcg32::seed_from_u64(base_seed ^ stream)
}
