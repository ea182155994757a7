//! Post-fit canonicalization of the LTC matrices.
//!
//! The sliced loss is invariant to composing a matrix with any rotation
//! about the normal or any tangent-plane reflection, so the optimizer
//! leaves each cell in an arbitrary orientation and neighboring cells would
//! interpolate incoherently. This stage removes that gauge freedom: per
//! cell, a hierarchical 1-D search over the in-plane rotation angle is run
//! for each of the four reflection candidates, and the matrix is rewritten
//! as `M * R(best_angle) * best_flip`.

use cgmath::{InnerSpace, Rad, SquareMatrix};
use log::info;
use rayon::prelude::*;

use crate::{
    Real,
    constants::M_TAU,
    lut::LtcTable,
    progress_bar,
    samplers::{Sampler, independent::Independent, sample_cosine_hemisphere_concentric},
    vec::{Mat3, Vec3, normalize_safe},
};

/// Coarse step of the first angle scan, in radians.
const COARSE_STEP: Real = 0.1;

#[derive(Clone, Debug)]
pub struct AlignOptions {
    /// Canonical cosine samples used to score candidate orientations.
    pub nb_samples: usize,
    /// Step divisors for the coarse-to-fine refinement passes.
    pub divisors: Vec<Real>,
    pub seed: u64,
}

impl AlignOptions {
    /// Divisor schedule 10, 100, ..., `10^nb_divs`, as driven from the CLI.
    #[must_use]
    pub fn with_divs(nb_divs: usize, seed: u64) -> Self {
        Self {
            nb_samples: 10_000,
            divisors: (1..=nb_divs as i32).map(|i| (10.0 as Real).powi(i)).collect(),
            seed,
        }
    }
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self::with_divs(3, 0)
    }
}

/// The four tangent-plane reflection candidates. The identity comes first
/// so exact ties (rotationally symmetric cells) canonicalize to the
/// identity reflection and zero rotation.
fn reflections() -> [Mat3; 4] {
    [
        Mat3::identity(),
        Mat3::from_diagonal(Vec3::new(-1.0, 1.0, 1.0)),
        Mat3::from_diagonal(Vec3::new(1.0, -1.0, 1.0)),
        Mat3::from_diagonal(Vec3::new(-1.0, -1.0, 1.0)),
    ]
}

/// Canonicalize every cell of the table in place. Deterministic and
/// order-independent across cells; safe to re-run on an already aligned
/// table (the found minimum is kept).
pub fn align(table: &mut LtcTable, opts: &AlignOptions) {
    info!("Aligning {} LTC matrices", table.n_cells());
    let mut sampler = Independent::with_seed(opts.seed);
    let cosine: Vec<Vec3> = (0..opts.nb_samples)
        .map(|_| sample_cosine_hemisphere_concentric(&sampler.next2d()))
        .collect();

    let flips = reflections();
    let progress = progress_bar(table.n_cells() as u64);
    table.mats_mut().par_iter_mut().for_each(|m| {
        *m = align_cell(m, &cosine, &flips, &opts.divisors);
        progress.inc(1);
    });
    progress.finish();
}

fn align_cell(m: &Mat3, cosine: &[Vec3], flips: &[Mat3; 4], divisors: &[Real]) -> Mat3 {
    let mut best_loss = Real::INFINITY;
    let mut best_mat = *m;

    for flip in flips {
        let (loss, mat) = search_rotation(m, flip, cosine, divisors);
        if loss < best_loss {
            best_loss = loss;
            best_mat = mat;
        }
    }
    best_mat
}

/// Coarse-to-fine 1-D minimization over the rotation angle for one
/// reflection candidate. The loss is non-convex in the angle (wrap-around,
/// coupling with the reflection), so this is a grid refinement, not a
/// closed-form solve: scan, narrow the window to +/- the scan step around
/// the winner, shrink the step by the next divisor, scan again.
fn search_rotation(
    m: &Mat3,
    flip: &Mat3,
    cosine: &[Vec3],
    divisors: &[Real],
) -> (Real, Mat3) {
    let mut step = COARSE_STEP;
    let mut lo = 0.0;
    let mut hi = M_TAU;
    let mut best = (Real::INFINITY, 0.0, *m);

    scan(m, flip, cosine, lo, hi, step, &mut best);
    for &div in divisors {
        lo = best.1 - step;
        hi = best.1 + step;
        step /= div;
        scan(m, flip, cosine, lo, hi, step, &mut best);
    }
    (best.0, best.2)
}

fn scan(
    m: &Mat3,
    flip: &Mat3,
    cosine: &[Vec3],
    lo: Real,
    hi: Real,
    step: Real,
    best: &mut (Real, Real, Mat3),
) {
    let mut phi = lo;
    while phi < hi {
        let mrf = m * Mat3::from_angle_z(Rad(phi)) * flip;
        let loss = orientation_loss(&mrf, cosine);
        if loss < best.0 {
            *best = (loss, phi, mrf);
        }
        phi += step;
    }
}

/// Mean squared residual between the canonical cosine samples and their
/// image under the candidate matrix.
fn orientation_loss(mrf: &Mat3, cosine: &[Vec3]) -> Real {
    let sum: Real = cosine
        .iter()
        .map(|c| (c - normalize_safe(mrf * c)).magnitude2())
        .sum();
    sum / cosine.len() as Real
}
