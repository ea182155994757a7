//! Final cleanup of the aligned LUT: symmetry constraints and scale
//! normalization. These are hard physical constraints, not heuristics;
//! leaving a symmetry-forbidden coefficient non-zero produces visible seams
//! once the table is bilinearly interpolated at render time.

use cgmath::InnerSpace;

use crate::{
    constants::NORM_EPS,
    lut::{LtcTable, LutLayout},
    vec::{Mat3, mat_row, mat_set},
};

/// Entries forbidden when the view lies in the x-z plane (phi = 0 or pi):
/// the lobe cannot couple y with x or z.
const FORBIDDEN_PHI0: [(usize, usize); 4] = [(0, 1), (1, 0), (1, 2), (2, 1)];
/// Entries forbidden when the view lies in the y-z plane (phi = pi/2).
const FORBIDDEN_PHI90: [(usize, usize); 4] = [(0, 1), (0, 2), (1, 0), (2, 0)];
/// All six off-diagonal entries, forbidden for a view along the normal.
const FORBIDDEN_THETA0: [(usize, usize); 6] =
    [(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)];

/// Symmetry zeroing, theta = 0 slice duplication, then row-3 scale
/// normalization, in that order (matching slices stay bit-identical through
/// the normalization).
pub fn postprocess(table: &mut LtcTable) {
    enforce_symmetry(table);
    normalize_scale(table);
}

fn zero_entries(m: &mut Mat3, entries: &[(usize, usize)]) {
    for &(r, c) in entries {
        mat_set(m, r, c, 0.0);
    }
}

/// Force symmetry-forbidden coefficients to exactly zero at the boundary
/// cells, and make every phi slice at theta = 0 identical (a view along the
/// normal has no azimuthal dependence).
pub fn enforce_symmetry(table: &mut LtcTable) {
    match table.layout() {
        LutLayout::Isotropic {
            alpha_bins,
            theta_bins,
        } => {
            for a in 0..alpha_bins {
                for t in 0..theta_bins {
                    let cell = a * theta_bins + t;
                    let m = table.mat_mut(cell);
                    // The whole table lives in the phi = 0 plane.
                    zero_entries(m, &FORBIDDEN_PHI0);
                    if t == 0 {
                        zero_entries(m, &FORBIDDEN_THETA0);
                    }
                }
            }
        },
        layout @ LutLayout::Anisotropic {
            alpha_x_bins,
            alpha_y_bins,
            theta_bins,
            phi_bins,
        } => {
            for ax in 0..alpha_x_bins {
                for ay in 0..alpha_y_bins {
                    for t in 0..theta_bins {
                        for p in 0..phi_bins {
                            let cell = layout.flat_index(&[ax, ay, t, p]);
                            let m = table.mat_mut(cell);
                            if p == 0 {
                                zero_entries(m, &FORBIDDEN_PHI0);
                            }
                            if p == phi_bins - 1 {
                                zero_entries(m, &FORBIDDEN_PHI90);
                            }
                            if t == 0 {
                                zero_entries(m, &FORBIDDEN_THETA0);
                            }
                        }
                    }
                    // theta = 0: same matrix for every phi.
                    let src = *table.mat(layout.flat_index(&[ax, ay, 0, 0]));
                    for p in 1..phi_bins {
                        *table.mat_mut(layout.flat_index(&[ax, ay, 0, p])) = src;
                    }
                }
            }
        },
    }
}

/// Divide every matrix by the Euclidean norm of its third row. The LTC
/// transform is invariant to uniform scaling, so this fixes a canonical
/// scale without changing the represented distribution.
pub fn normalize_scale(table: &mut LtcTable) {
    for m in table.mats_mut() {
        let norm = mat_row(m, 2).magnitude();
        *m = *m * (1.0 / (norm + NORM_EPS));
    }
}
