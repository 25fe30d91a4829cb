//! Where proposed moves and pauses come from.

use reef_core::{Delta, PauseConfig};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;
use std::time::Duration;

/// Supplies the delta a creature proposes on each loop iteration
pub trait DeltaSource: Send {
    fn propose(&mut self) -> Delta;
}

/// Uniform random unit steps: each component drawn from {-1, 0, +1}
#[derive(Debug, Clone)]
pub struct RandomDeltas {
    rng: ChaCha8Rng,
}

impl RandomDeltas {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl DeltaSource for RandomDeltas {
    fn propose(&mut self) -> Delta {
        Delta::new(
            self.rng.gen_range(-1..=1),
            self.rng.gen_range(-1..=1),
            self.rng.gen_range(-1..=1),
        )
    }
}

/// Replays a fixed list of deltas, wrapping around at the end
#[derive(Debug, Clone)]
pub struct ScriptedDeltas {
    deltas: Vec<Delta>,
    cursor: usize,
}

impl ScriptedDeltas {
    /// An empty script proposes [`Delta::ZERO`] forever.
    pub fn new(deltas: Vec<Delta>) -> Self {
        Self { deltas, cursor: 0 }
    }
}

impl DeltaSource for ScriptedDeltas {
    fn propose(&mut self) -> Delta {
        if self.deltas.is_empty() {
            return Delta::ZERO;
        }
        let delta = self.deltas[self.cursor];
        self.cursor = (self.cursor + 1) % self.deltas.len();
        delta
    }
}

/// Draws the sleep between two move attempts
#[derive(Debug, Clone)]
pub struct PauseSampler {
    min_ms: u64,
    max_ms: u64,
    rng: ChaCha8Rng,
}

impl PauseSampler {
    pub fn new(config: &PauseConfig, seed: u64) -> Self {
        Self {
            min_ms: config.min_ms,
            max_ms: config.max_ms.max(config.min_ms),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_pause(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_ms..=self.max_ms))
    }
}
