use cgmath::InnerSpace;

use crate::{
    Real,
    constants::{FRAC_PI_2, M_PI, M_TAU},
    vec::{Vec2, Vec3, normalize_safe},
};

pub trait Sampler: Send + Sync {
    fn next(&mut self) -> Real;
    fn next2d(&mut self) -> Vec2;
    fn next_gaussian(&mut self) -> Real;
}

/// Uniform direction on the unit sphere, from three Gaussian variates.
#[must_use]
pub fn sample_sphere_gaussian(sampler: &mut dyn Sampler) -> Vec3 {
    normalize_safe(Vec3::new(
        sampler.next_gaussian(),
        sampler.next_gaussian(),
        sampler.next_gaussian(),
    ))
}

pub mod independent;

/// Map two uniform variates to the unit disc with the area-preserving
/// concentric mapping of Shirley & Chiu.
#[must_use]
pub fn sample_concentric_disc(sample: &Vec2) -> Vec2 {
    let r1 = sample.x.mul_add(2.0, -1.0);
    let r2 = sample.y.mul_add(2.0, -1.0);

    // The center point would divide by zero below
    if r1 == 0.0 && r2 == 0.0 {
        return Vec2::new(0.0, 0.0);
    }

    let (r, theta) = if r1.abs() > r2.abs() {
        (r1, M_PI * r2 / (4.0 * r1))
    } else {
        (r2, FRAC_PI_2 - M_PI * r1 / (4.0 * r2))
    };

    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere sample, by lifting a concentric disc point.
#[must_use]
pub fn sample_cosine_hemisphere_concentric(sample: &Vec2) -> Vec3 {
    let p = sample_concentric_disc(sample);
    let z = p.x.mul_add(-p.x, p.y.mul_add(-p.y, 1.0)).max(0.0).sqrt();
    normalize_safe(Vec3::new(p.x, p.y, z))
}

/// Exact visible-normal sampling for anisotropic GGX (Heitz, JCGT 2018).
/// Returns the reflected light direction and the sampled micro-normal.
/// `v` is floor-clamped to the upper hemisphere on entry.
#[must_use]
pub fn sample_ggx_vndf(sample: &Vec2, v: &Vec3, alpha_x: Real, alpha_y: Real) -> (Vec3, Vec3) {
    let v = Vec3::new(v.x, v.y, v.z.max(0.0));

    // Stretch the view into the isotropic configuration
    let vh = normalize_safe(Vec3::new(alpha_x * v.x, alpha_y * v.y, v.z));

    // Tangent frame; fixed fallback when vh is the pole
    let lensq = vh.x * vh.x + vh.y * vh.y;
    let t1 = if lensq > 0.0 {
        Vec3::new(-vh.y, vh.x, 0.0) / lensq.sqrt()
    } else {
        Vec3::new(1.0, 0.0, 0.0)
    };
    let t2 = vh.cross(t1);

    // Polar-cap warped disc sample
    let r = sample.x.sqrt();
    let phi = M_TAU * sample.y;
    let p1 = r * phi.cos();
    let mut p2 = r * phi.sin();
    let s = 0.5 * (1.0 + vh.z);
    p2 = (1.0 - s) * p1.mul_add(-p1, 1.0).max(0.0).sqrt() + s * p2;

    let nh = t1 * p1
        + t2 * p2
        + vh * p1.mul_add(-p1, p2.mul_add(-p2, 1.0)).max(0.0).sqrt();

    // Unstretch
    let ne = normalize_safe(Vec3::new(alpha_x * nh.x, alpha_y * nh.y, nh.z.max(0.0)));

    let l = normalize_safe(2.0 * ne.dot(v) * ne - v);
    (l, ne)
}
