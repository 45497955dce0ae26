//! The single seeded pseudo-random stream owned by a run.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Position of a [`SimRng`] within its stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RngState {
    pub seed: u64,
    pub draws: u64,
}

/// `SmallRng` that counts its 64-bit draws so it can be restored exactly.
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    draws: u64,
    inner: SmallRng,
}

impl SimRng {
    #[must_use]
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Re-create a stream positioned exactly where `state` was captured.
    #[must_use]
    pub fn restore(state: RngState) -> Self {
        let mut inner = SmallRng::seed_from_u64(state.seed);
        for _ in 0..state.draws {
            inner.next_u64();
        }
        Self {
            seed: state.seed,
            draws: state.draws,
            inner,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            draws: self.draws,
        }
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
