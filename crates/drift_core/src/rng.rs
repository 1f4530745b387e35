//! Deterministic random stream utilities.
//!
//! Every stochastic component (a release process, an orientation action) owns
//! its own generator: the simulation seed keys ChaCha and the component's block
//! key picks the ChaCha stream. Two components never share a sequence, and
//! adding a component leaves the draws of the others untouched. Without a
//! configured seed the generators are seeded from entropy.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Configuration key holding the optional simulation seed.
pub const SEED_KEY: &str = "app.simulation.seed";

/// Generator for the component identified by `label`.
pub fn seeded_rng(seed: Option<u64>, label: &str) -> ChaCha8Rng {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::seed_from_u64(rand::thread_rng().gen()),
    };
    rng.set_stream(stream_id(label));
    rng
}

/// FNV-1a digest of a block key, stable across builds and platforms.
fn stream_id(label: &str) -> u64 {
    label.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
