#[macro_use]
extern crate quick_error;

pub type Real = f64;

pub mod constants {
    use std::f64;

    use crate::Real;
    pub const M_PI: Real = f64::consts::PI;
    pub const M_TAU: Real = f64::consts::TAU;
    pub const INV_PI: Real = f64::consts::FRAC_1_PI;
    pub const FRAC_PI_2: Real = f64::consts::FRAC_PI_2;
    /// Guard added to every normalization denominator.
    pub const NORM_EPS: Real = 1e-8;
    /// Floor for the anisotropic roughness grid (keeps D away from a Dirac).
    pub const ALPHA_MIN_ANISO: Real = 1e-4;
    /// Floor for the isotropic roughness grid.
    pub const ALPHA_MIN_ISO: Real = 0.01;
    /// Polar angles are scaled by this factor to stay off the grazing angle.
    pub const THETA_MARGIN_ANISO: Real = 0.9999;
    pub const THETA_MARGIN_ISO: Real = 0.99;
    /// Default candidates drawn per requested sample when filling a target
    /// buffer.
    pub const OVERSAMPLE_FACTOR: usize = 4;
}

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// Rejection sampling did not yield enough accepted directions
        InsufficientSamples(cell: usize, accepted: usize, requested: usize) {
            display("Rejection sampling for cell {} accepted only {}/{} samples; raise the oversampling factor", cell, accepted, requested)
        }
        /// A fitted LTC matrix could not be inverted
        SingularMatrix(cell: usize) {
            display("LTC matrix for cell {} is singular, cannot transform to cosine space", cell)
        }
        /// Invalid fitting configuration
        InvalidConfig(what: String) {
            display("Invalid configuration: {}", what)
        }
        /// I/O error while persisting the LUT
        Io(err: std::io::Error) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

/// Progress bar used by the long-running pipeline stages.
#[must_use]
pub fn progress_bar(len: u64) -> indicatif::ProgressBar {
    use std::fmt::Write;

    use indicatif::{ProgressBar, ProgressState, ProgressStyle};

    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar}] {pos:>7}/{len:7} ({eta})",
        )
        .unwrap()
        .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
            write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap();
        })
        .progress_chars("#>-"),
    );
    progress
}

/// Resolve a signed `--threads` request: positive is taken as-is, negative
/// leaves that many cores free (clamped to at least one thread). Zero means
/// "keep the default pool" and is handled by the caller.
#[must_use]
pub fn effective_threads(requested: i32) -> usize {
    let n = if requested < 0 {
        #[allow(clippy::cast_possible_wrap)]
        (num_cpus::get() as i32 + requested).max(1)
    } else {
        requested
    };
    n as usize
}

pub mod align;
pub mod brdf;
pub mod buffer;
pub mod fit;
pub mod lut;
pub mod output;
pub mod post;
pub mod rejection;
pub mod samplers;
pub mod vec;

#[cfg(test)]
mod tests {
    use super::effective_threads;

    #[test]
    fn thread_request_resolution() {
        assert_eq!(effective_threads(3), 3);
        let cores = num_cpus::get();
        assert_eq!(effective_threads(-1), cores.saturating_sub(1).max(1));
        // A request freeing more cores than exist clamps to one thread.
        assert_eq!(effective_threads(-(cores as i32) - 10), 1);
    }
}
