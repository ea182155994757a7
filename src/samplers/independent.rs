use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::{Real, vec::Vec2};

use super::Sampler;

pub struct Independent {
    rnd: ChaCha8Rng,
}

impl Sampler for Independent {
    fn next(&mut self) -> Real {
        self.rnd.random()
    }

    fn next2d(&mut self) -> Vec2 {
        Vec2::new(self.rnd.random(), self.rnd.random())
    }

    fn next_gaussian(&mut self) -> Real {
        self.rnd.sample(StandardNormal)
    }
}

impl Independent {
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rnd: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Deterministic per-work-item sampler, so cells can be processed in
    /// parallel in any order.
    #[must_use]
    pub fn for_cell(base_seed: u64, stage: u64, epoch: usize, cell: usize) -> Self {
        let mix = stage
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((epoch as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
            .wrapping_add(cell as u64);
        Self::with_seed(base_seed.wrapping_add(mix))
    }
}
