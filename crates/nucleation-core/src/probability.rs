//! Nucleation probability per sample point.
//!
//! The rate follows classical nucleation theory with a supersaturation
//! driving force:
//!
//! ```text
//! s = max(c - floor, MIN_SUPERSATURATION)
//! J = k1 * exp(-k2 / s)
//! p = 1 - exp(-J * timestep * skip_steps * measure)
//! ```
//!
//! `measure` is either the sample's quadrature weight or a fixed cell
//! measure from [`uniform_cell_measure`].

use serde::{Deserialize, Serialize};

/// Lower clamp applied to the supersaturation so the rate stays finite.
pub const MIN_SUPERSATURATION: f64 = 1.0e-6;

/// Constants of the nucleation rate model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityModel {
    /// Rate prefactor.
    pub k1: f64,
    /// Rate exponent constant.
    pub k2: f64,
    /// Field value below which there is no driving force.
    pub saturation_floor: f64,
    /// Simulation timestep size.
    pub timestep: f64,
    /// Steps between pipeline runs; scales the exposure window.
    pub skip_steps: u32,
}

impl ProbabilityModel {
    /// Clamped supersaturation for a field value.
    pub fn supersaturation(&self, field: f64) -> f64 {
        (field - self.saturation_floor).max(MIN_SUPERSATURATION)
    }

    /// Nucleation rate `J` for a field value.
    pub fn rate(&self, field: f64) -> f64 {
        self.k1 * (-self.k2 / self.supersaturation(field)).exp()
    }

    /// Probability that a nucleus forms at a sample with the given field
    /// value and measure during one pipeline interval.
    pub fn probability(&self, field: f64, measure: f64) -> f64 {
        let exposure = self.timestep * f64::from(self.skip_steps) * measure;
        1.0 - (-self.rate(field) * exposure).exp()
    }
}

/// Finest uniform grid spacing: `extent / (2^refine_factor * degree)`.
pub fn uniform_grid_spacing(extent: f64, refine_factor: u32, element_degree: u32) -> f64 {
    let cells = 2.0_f64.powi(i32::try_from(refine_factor).unwrap_or(i32::MAX));
    extent / (cells * f64::from(element_degree.max(1)))
}

/// Measure of one uniform grid cell in `D` dimensions: `spacing^D`.
pub fn uniform_cell_measure<const D: usize>(spacing: f64) -> f64 {
    spacing.powi(i32::try_from(D).unwrap_or(i32::MAX))
}
