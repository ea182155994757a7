use cgmath::Zero;
use rayon::prelude::*;

use crate::vec::{Vec3, is_finite};

/// Flat (cell x sample) storage for batches of directions, one fixed-size
/// slice per LUT cell.
pub struct DirectionBuffer {
    data: Vec<Vec3>,
    n_cells: usize,
    n_samples: usize,
}

impl DirectionBuffer {
    #[must_use]
    pub fn with_size(n_cells: usize, n_samples: usize) -> Self {
        Self {
            data: vec![Vec3::zero(); n_cells * n_samples],
            n_cells,
            n_samples,
        }
    }

    #[must_use]
    pub const fn n_cells(&self) -> usize {
        self.n_cells
    }

    #[must_use]
    pub const fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[must_use]
    pub fn cell(&self, cell: usize) -> &[Vec3] {
        let start = cell * self.n_samples;
        &self.data[start..start + self.n_samples]
    }

    pub fn cell_mut(&mut self, cell: usize) -> &mut [Vec3] {
        let start = cell * self.n_samples;
        &mut self.data[start..start + self.n_samples]
    }

    /// Parallel per-cell mutable chunks.
    pub fn par_cells_mut(&mut self) -> rayon::slice::ChunksMut<'_, Vec3> {
        self.data.par_chunks_mut(self.n_samples)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(is_finite)
    }
}
