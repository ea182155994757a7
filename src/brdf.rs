use cgmath::InnerSpace;

use crate::{
    Real,
    constants::M_PI,
    samplers::{Sampler, sample_ggx_vndf},
    vec::{Vec3, normalize_safe},
};

/// Anisotropic GGX microfacet model after Heitz,
/// "Sampling the GGX Distribution of Visible Normals" (JCGT 2018).
///
/// All directions live in the local shading frame (z is the surface normal).
/// The Fresnel term is not included and the cosine foreshortening factor of
/// the rendering equation is pre-cancelled:
///
/// f(V, L) = D(H) * G2(V, L) / (4 * cos(theta_v))
#[derive(Clone, Copy, Debug)]
pub struct GgxAniso {
    pub alpha_x: Real,
    pub alpha_y: Real,
}

impl GgxAniso {
    /// `alpha_x`/`alpha_y` must be floor-clamped away from zero by the
    /// caller; the distribution degenerates to a Dirac otherwise.
    #[must_use]
    pub const fn new(alpha_x: Real, alpha_y: Real) -> Self {
        Self { alpha_x, alpha_y }
    }

    /// Normal distribution value for the (unit) micro-normal `n`.
    #[must_use]
    pub fn d(&self, n: &Vec3) -> Real {
        let t = (n.x / self.alpha_x).powi(2) + (n.y / self.alpha_y).powi(2) + n.z * n.z;
        1.0 / (M_PI * self.alpha_x * self.alpha_y * t * t)
    }

    /// Smith shadowing auxiliary term.
    #[must_use]
    pub fn lambda(&self, v: &Vec3) -> Real {
        let a2 = (v.x * self.alpha_x).powi(2) + (v.y * self.alpha_y).powi(2);
        0.5 * (-1.0 + (1.0 + a2 / (v.z * v.z)).sqrt())
    }

    /// Smith masking term; zero below the horizon.
    #[must_use]
    pub fn g1(&self, v: &Vec3) -> Real {
        if v.z < 0.0 {
            0.0
        } else {
            1.0 / (1.0 + self.lambda(v))
        }
    }

    /// Smith joint masking-shadowing term; zero if either direction is
    /// below the horizon.
    #[must_use]
    pub fn g2(&self, v: &Vec3, l: &Vec3) -> Real {
        if v.z < 0.0 || l.z < 0.0 {
            0.0
        } else {
            1.0 / (1.0 + self.lambda(v) + self.lambda(l))
        }
    }

    /// BRDF value and half-vector pdf for a view/light pair.
    /// `v.z` must be strictly positive (the LUT grid never reaches grazing).
    #[must_use]
    pub fn eval(&self, v: &Vec3, l: &Vec3) -> (Real, Real) {
        let h = normalize_safe(v + l);
        let pdf = self.d(&h);
        let value = pdf * self.g2(v, l) / (4.0 * v.z);
        (value, pdf)
    }

    /// Rejection-sampling acceptance weight G2/G1, in [0, 1] by construction
    /// of the Smith model.
    #[must_use]
    pub fn acceptance_weight(&self, v: &Vec3, l: &Vec3) -> Real {
        let g1 = self.g1(v);
        if g1 <= 0.0 {
            0.0
        } else {
            self.g2(v, l) / g1
        }
    }

    /// Monte-Carlo estimate of the amplitude (`nD`, average G2/G1 over exact
    /// visible-normal samples) and the Schlick-weighted Fresnel companion
    /// (`fD`, same weight times `(1 - V.H)^5`).
    /// See "Real-Time Area Lighting: a Journey from Research to Production"
    /// (SIGGRAPH 2016) for the amplitude/Fresnel split.
    #[must_use]
    pub fn amplitude_fresnel(
        &self,
        v: &Vec3,
        nb_samples: usize,
        sampler: &mut dyn Sampler,
    ) -> (Real, Real) {
        let v = Vec3::new(v.x, v.y, v.z.max(0.0));

        let mut sum_w = 0.0;
        let mut sum_fw = 0.0;
        for _ in 0..nb_samples {
            let (l, _) = sample_ggx_vndf(&sampler.next2d(), &v, self.alpha_x, self.alpha_y);
            let h = normalize_safe(v + l);
            let w = self.acceptance_weight(&v, &l);
            let fr = (1.0 - v.dot(h)).powi(5);
            sum_w += w;
            sum_fw += fr * w;
        }

        let inv_n = 1.0 / nb_samples as Real;
        (sum_w * inv_n, sum_fw * inv_n)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::assert_abs_diff_eq;

    use crate::{
        constants::INV_PI,
        samplers::independent::Independent,
        vec::{Vec3, spherical_to_directional},
    };

    use super::GgxAniso;

    #[test]
    fn d_matches_closed_form_at_normal_incidence() {
        let ggx = GgxAniso::new(1.0, 1.0);
        assert_abs_diff_eq!(ggx.d(&Vec3::new(0.0, 0.0, 1.0)), INV_PI, epsilon = 1e-12);
    }

    #[test]
    fn g_terms_are_bounded() {
        let ggx = GgxAniso::new(0.5, 0.2);
        for (theta_v, theta_l) in [(0.1, 1.2), (0.7, 0.7), (1.4, 0.3)] {
            let v = spherical_to_directional(theta_v, 0.3);
            let l = spherical_to_directional(theta_l, 2.1);
            let g1 = ggx.g1(&v);
            let g2 = ggx.g2(&v, &l);
            assert!(g1 <= 1.0);
            assert!(g2 <= g1);
            assert!(g2 >= 0.0);
        }
    }

    #[test]
    fn g_terms_vanish_below_horizon() {
        let ggx = GgxAniso::new(0.5, 0.5);
        let below = Vec3::new(0.3, 0.1, -0.5);
        let above = Vec3::new(0.0, 0.0, 1.0);
        assert_abs_diff_eq!(ggx.g1(&below), 0.0);
        assert_abs_diff_eq!(ggx.g2(&below, &above), 0.0);
        assert_abs_diff_eq!(ggx.g2(&above, &below), 0.0);
    }

    #[test]
    fn eval_combines_d_and_g2() {
        let ggx = GgxAniso::new(0.8, 0.3);
        let v = spherical_to_directional(0.4, 0.0);
        let l = spherical_to_directional(0.6, 1.0);
        let (value, pdf) = ggx.eval(&v, &l);
        assert_abs_diff_eq!(
            value,
            pdf * ggx.g2(&v, &l) / (4.0 * v.z),
            epsilon = 1e-12
        );
        assert!(value >= 0.0 && pdf > 0.0);
    }

    #[test]
    fn amplitude_is_near_one_for_smooth_normal_incidence() {
        // A narrow lobe viewed along the normal loses almost no energy to
        // shadowing, so the G2/G1 average approaches 1.
        let ggx = GgxAniso::new(0.05, 0.05);
        let mut sampler = Independent::with_seed(7);
        let v = Vec3::new(0.0, 0.0, 1.0);
        let (nd, fd) = ggx.amplitude_fresnel(&v, 10_000, &mut sampler);
        assert!((nd - 1.0).abs() < 0.05, "nD = {nd}");
        assert!((0.0..=1.0).contains(&fd));
    }

    #[test]
    fn amplitude_drops_for_rough_surfaces() {
        let ggx = GgxAniso::new(1.0, 1.0);
        let mut sampler = Independent::with_seed(11);
        let v = Vec3::new(0.0, 0.0, 1.0);
        let (nd, _) = ggx.amplitude_fresnel(&v, 10_000, &mut sampler);
        assert!(nd > 0.0 && nd < 1.0, "nD = {nd}");
    }
}
