//! Pseudo-random initial fill.
//!
//! The hash is pure u32 arithmetic so the WGSL `initialize` kernel and the host
//! produce bit-identical buffers for the same seed.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::GridSize;

/// Two-component seed for the initial fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seed(pub [f32; 2]);

impl Seed {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Seed([rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)])
    }

    pub(crate) fn bits(self) -> [u32; 2] {
        [self.0[0].to_bits(), self.0[1].to_bits()]
    }
}

/// PCG output permutation over a single LCG step.
pub(crate) fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Value in `[0, 1)` for grid coordinate `(x, y)` under `seed`.
pub fn initial_value((x, y): (u32, u32), seed: Seed) -> f32 {
    let [sx, sy] = seed.bits();
    let s = pcg_hash(sx ^ pcg_hash(sy));
    let h = pcg_hash(x ^ pcg_hash(y ^ s));
    // top 24 bits fit the f32 mantissa exactly
    (h >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Overwrites every element of `values` with its initial value.
pub fn fill(values: &mut [f32], grid: GridSize, seed: Seed) {
    values.par_iter_mut().enumerate().for_each(|(i, v)| {
        *v = initial_value(grid.to_coord(i as u32), seed);
    });
}
