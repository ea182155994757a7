use cgmath::SquareMatrix;
use rayon::prelude::*;

use crate::{
    Error, Real, Result,
    buffer::DirectionBuffer,
    constants::{
        ALPHA_MIN_ANISO, ALPHA_MIN_ISO, FRAC_PI_2, THETA_MARGIN_ANISO, THETA_MARGIN_ISO,
    },
    vec::{Mat3, Vec3, normalize_safe, spherical_to_directional},
};

/// Discretization of the LUT axes. The anisotropic table spans
/// (alpha_x, alpha_y, theta, phi); the isotropic one (alpha, theta) with the
/// view pinned to the phi = 0 plane. Cells are flattened with the last axis
/// fastest, matching the exported tensor's C order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LutLayout {
    Isotropic {
        alpha_bins: usize,
        theta_bins: usize,
    },
    Anisotropic {
        alpha_x_bins: usize,
        alpha_y_bins: usize,
        theta_bins: usize,
        phi_bins: usize,
    },
}

impl LutLayout {
    #[must_use]
    pub const fn n_cells(&self) -> usize {
        match *self {
            Self::Isotropic {
                alpha_bins,
                theta_bins,
            } => alpha_bins * theta_bins,
            Self::Anisotropic {
                alpha_x_bins,
                alpha_y_bins,
                theta_bins,
                phi_bins,
            } => alpha_x_bins * alpha_y_bins * theta_bins * phi_bins,
        }
    }

    /// Bin counts per axis, in storage order.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match *self {
            Self::Isotropic {
                alpha_bins,
                theta_bins,
            } => vec![alpha_bins, theta_bins],
            Self::Anisotropic {
                alpha_x_bins,
                alpha_y_bins,
                theta_bins,
                phi_bins,
            } => vec![alpha_x_bins, alpha_y_bins, theta_bins, phi_bins],
        }
    }

    /// Flat cell index of per-axis indices (storage order, last axis
    /// fastest).
    #[must_use]
    pub fn flat_index(&self, idx: &[usize]) -> usize {
        match *self {
            Self::Isotropic { theta_bins, .. } => idx[0] * theta_bins + idx[1],
            Self::Anisotropic {
                alpha_y_bins,
                theta_bins,
                phi_bins,
                ..
            } => ((idx[0] * alpha_y_bins + idx[1]) * theta_bins + idx[2]) * phi_bins + idx[3],
        }
    }

    /// Roughness and view configuration of one flat cell index.
    #[must_use]
    pub fn cell_params(&self, cell: usize) -> CellParams {
        match *self {
            Self::Isotropic {
                alpha_bins,
                theta_bins,
            } => {
                let theta_idx = cell % theta_bins;
                let alpha_idx = cell / theta_bins;
                debug_assert!(alpha_idx < alpha_bins);
                let alpha = (alpha_idx as Real / (alpha_bins - 1) as Real).max(ALPHA_MIN_ISO);
                let theta =
                    theta_idx as Real / (theta_bins - 1) as Real * THETA_MARGIN_ISO * FRAC_PI_2;
                CellParams {
                    alpha_x: alpha,
                    alpha_y: alpha,
                    theta,
                    phi: 0.0,
                }
            },
            Self::Anisotropic {
                alpha_x_bins,
                alpha_y_bins,
                theta_bins,
                phi_bins,
            } => {
                let phi_idx = cell % phi_bins;
                let rest = cell / phi_bins;
                let theta_idx = rest % theta_bins;
                let rest = rest / theta_bins;
                let alpha_y_idx = rest % alpha_y_bins;
                let alpha_x_idx = rest / alpha_y_bins;
                debug_assert!(alpha_x_idx < alpha_x_bins);
                let alpha_x =
                    (alpha_x_idx as Real / (alpha_x_bins - 1) as Real).max(ALPHA_MIN_ANISO);
                let alpha_y =
                    (alpha_y_idx as Real / (alpha_y_bins - 1) as Real).max(ALPHA_MIN_ANISO);
                let theta = theta_idx as Real / (theta_bins - 1) as Real
                    * THETA_MARGIN_ANISO
                    * FRAC_PI_2;
                let phi = phi_idx as Real / (phi_bins - 1) as Real * FRAC_PI_2;
                CellParams {
                    alpha_x,
                    alpha_y,
                    theta,
                    phi,
                }
            },
        }
    }
}

/// Roughness pair and view angles of a single LUT cell.
#[derive(Clone, Copy, Debug)]
pub struct CellParams {
    pub alpha_x: Real,
    pub alpha_y: Real,
    pub theta: Real,
    pub phi: Real,
}

impl CellParams {
    /// View direction for this cell, in the local shading frame.
    #[must_use]
    pub fn view(&self) -> Vec3 {
        spherical_to_directional(self.theta, self.phi)
    }
}

/// The LUT itself: one 3x3 matrix per cell, identity-initialized, plus the
/// per-cell parameters. The matrices are the only mutable state of the whole
/// pipeline; fitting, alignment and post-processing mutate them in strict
/// sequence.
pub struct LtcTable {
    layout: LutLayout,
    mats: Vec<Mat3>,
    params: Vec<CellParams>,
}

impl LtcTable {
    #[must_use]
    pub fn new(layout: LutLayout) -> Self {
        let n = layout.n_cells();
        let params = (0..n).map(|c| layout.cell_params(c)).collect();
        Self {
            layout,
            mats: vec![Mat3::identity(); n],
            params,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> LutLayout {
        self.layout
    }

    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.mats.len()
    }

    #[must_use]
    pub fn mat(&self, cell: usize) -> &Mat3 {
        &self.mats[cell]
    }

    pub fn mat_mut(&mut self, cell: usize) -> &mut Mat3 {
        &mut self.mats[cell]
    }

    #[must_use]
    pub fn mats(&self) -> &[Mat3] {
        &self.mats
    }

    pub fn mats_mut(&mut self) -> &mut [Mat3] {
        &mut self.mats
    }

    #[must_use]
    pub fn params(&self, cell: usize) -> &CellParams {
        &self.params[cell]
    }

    /// Apply each cell's matrix to that cell's batch of cosine samples and
    /// renormalize: the forward map cosine -> target distribution.
    pub fn transform_to_target(&self, samples: &mut DirectionBuffer) {
        debug_assert_eq!(samples.n_cells(), self.n_cells());
        let mats = &self.mats;
        samples
            .par_cells_mut()
            .enumerate()
            .for_each(|(cell, dirs)| {
                let m = mats[cell];
                for d in dirs {
                    *d = normalize_safe(m * *d);
                }
            });
    }

    /// Apply each cell's matrix inverse and renormalize: the map used for
    /// importance-sampling the target at render time. A near-singular fitted
    /// matrix is reported, not propagated as NaNs.
    pub fn transform_to_cosine(&self, samples: &mut DirectionBuffer) -> Result<()> {
        debug_assert_eq!(samples.n_cells(), self.n_cells());
        let inverses = self
            .mats
            .iter()
            .enumerate()
            .map(|(cell, m)| m.invert().ok_or(Error::SingularMatrix(cell)))
            .collect::<Result<Vec<_>>>()?;
        samples
            .par_cells_mut()
            .enumerate()
            .for_each(|(cell, dirs)| {
                let m = inverses[cell];
                for d in dirs {
                    *d = normalize_safe(m * *d);
                }
            });
        Ok(())
    }
}
