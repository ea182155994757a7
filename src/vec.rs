use crate::{Real, constants::NORM_EPS};
use cgmath::{self, InnerSpace};

// 2D
pub type Vec2 = cgmath::Vector2<Real>;

// 3D
pub type Vec3 = cgmath::Vector3<Real>;

// Matrices
pub type Mat3 = cgmath::Matrix3<Real>;

#[must_use]
pub fn spherical_to_directional(theta: Real, phi: Real) -> Vec3 {
    Vec3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

/// Normalize with an epsilon in the denominator so zero-length inputs
/// stay finite instead of turning into NaNs.
#[must_use]
pub fn normalize_safe(v: Vec3) -> Vec3 {
    v / (v.magnitude() + NORM_EPS)
}

/// Reflect `v` about the (unit) normal `n`.
#[must_use]
pub fn reflect(v: &Vec3, n: &Vec3) -> Vec3 {
    2.0 * v.dot(*n) * *n - *v
}

/// Element of `m` at (row, column). cgmath stores columns, which makes
/// row-wise formulas easy to get backwards; go through these helpers.
#[must_use]
pub fn mat_at(m: &Mat3, row: usize, col: usize) -> Real {
    m[col][row]
}

pub fn mat_set(m: &mut Mat3, row: usize, col: usize, value: Real) {
    m[col][row] = value;
}

/// Row `r` of `m` as a vector.
#[must_use]
pub fn mat_row(m: &Mat3, r: usize) -> Vec3 {
    Vec3::new(m[0][r], m[1][r], m[2][r])
}

/// Outer product `a bᵀ` (column j is `a * b[j]`).
#[must_use]
pub fn outer(a: &Vec3, b: &Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

#[must_use]
pub fn is_finite(v: &Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}
