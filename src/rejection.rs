//! Exact sampling of the GGX scattering distribution.
//!
//! The visible-normal sampler is exact for the distribution of visible
//! micro-normals, not for the full BRDF-weighted light distribution under
//! height-correlated Smith masking. Classic rejection sampling with the
//! G2/G1 weight ratio closes that gap.

use crate::{
    brdf::GgxAniso,
    samplers::{Sampler, sample_ggx_vndf},
    vec::Vec3,
};

/// Draw `n_draws` candidates from the visible-normal sampler and keep those
/// passing the accept/reject test. The caller must over-sample (the expected
/// acceptance rate is well below 1) and check the returned count.
#[must_use]
pub fn rejection_sampling(
    n_draws: usize,
    brdf: &GgxAniso,
    v: &Vec3,
    sampler: &mut dyn Sampler,
) -> Vec<Vec3> {
    let v = Vec3::new(v.x, v.y, v.z.max(0.0));

    let mut accepted = Vec::with_capacity(n_draws / 2);
    for _ in 0..n_draws {
        let (l, _) = sample_ggx_vndf(&sampler.next2d(), &v, brdf.alpha_x, brdf.alpha_y);
        let w = brdf.acceptance_weight(&v, &l);
        if w > sampler.next() {
            accepted.push(l);
        }
    }
    accepted
}

/// Amortized variant: one accept/reject trial per existing buffer slot,
/// replacing the slot on acceptance. Keeps an optimization buffer fresh
/// across epochs without re-running the full multi-pass loop.
pub fn refresh_buffer(buffer: &mut [Vec3], brdf: &GgxAniso, v: &Vec3, sampler: &mut dyn Sampler) {
    let v = Vec3::new(v.x, v.y, v.z.max(0.0));

    for slot in buffer {
        let (l, _) = sample_ggx_vndf(&sampler.next2d(), &v, brdf.alpha_x, brdf.alpha_y);
        let w = brdf.acceptance_weight(&v, &l);
        if w > sampler.next() {
            *slot = l;
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::InnerSpace;

    use crate::{
        brdf::GgxAniso,
        samplers::{Sampler, independent::Independent, sample_cosine_hemisphere_concentric,
                   sample_ggx_vndf},
        vec::{Vec3, spherical_to_directional},
    };

    use super::{refresh_buffer, rejection_sampling};

    #[test]
    fn acceptance_weight_is_a_probability() {
        let brdf = GgxAniso::new(0.9, 0.3);
        let mut sampler = Independent::with_seed(5);
        let v = spherical_to_directional(1.1, 0.7);
        for _ in 0..1000 {
            let (l, _) = sample_ggx_vndf(&sampler.next2d(), &v, brdf.alpha_x, brdf.alpha_y);
            let w = brdf.acceptance_weight(&v, &l);
            assert!((0.0..=1.0).contains(&w), "w = {w}");
        }
    }

    #[test]
    fn accepted_samples_are_valid_directions() {
        let brdf = GgxAniso::new(0.5, 0.5);
        let mut sampler = Independent::with_seed(6);
        let v = spherical_to_directional(0.8, 0.2);
        let accepted = rejection_sampling(4096, &brdf, &v, &mut sampler);
        assert!(!accepted.is_empty());
        for l in &accepted {
            assert!((l.magnitude() - 1.0).abs() < 1e-6);
            assert!(l.z >= 0.0);
        }
    }

    #[test]
    fn acceptance_rate_matches_the_analytic_value() {
        // For alpha = 1 and a view along the normal the weight reduces to
        // G2(L) = 2 cos(theta_l) / (1 + cos(theta_l)) over cosine-distributed
        // half-vectors, whose expectation is 1 + ln(1/2) ~= 0.3069.
        let brdf = GgxAniso::new(1.0, 1.0);
        let mut sampler = Independent::with_seed(7);
        let v = Vec3::new(0.0, 0.0, 1.0);
        let n = 40_000;
        let accepted = rejection_sampling(n, &brdf, &v, &mut sampler);
        let rate = accepted.len() as f64 / n as f64;
        assert!((rate - 0.3069).abs() < 0.02, "rate = {rate}");
    }

    #[test]
    fn refresh_keeps_buffer_length_and_validity() {
        let brdf = GgxAniso::new(0.4, 0.8);
        let mut sampler = Independent::with_seed(8);
        let v = spherical_to_directional(0.5, 1.0);
        let mut buffer: Vec<Vec3> = (0..512)
            .map(|_| sample_cosine_hemisphere_concentric(&sampler.next2d()))
            .collect();
        let before = buffer.clone();
        refresh_buffer(&mut buffer, &brdf, &v, &mut sampler);
        assert_eq!(buffer.len(), before.len());
        let replaced = buffer.iter().zip(&before).filter(|(a, b)| a != b).count();
        assert!(replaced > 0, "no slot was refreshed");
        for l in &buffer {
            assert!((l.magnitude() - 1.0).abs() < 1e-6);
        }
    }
}
