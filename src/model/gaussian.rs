//! Gaussian peak fit, used for the normalized residual distribution.

use serde::{Deserialize, Serialize};

use super::least_squares::{levenberg_marquardt, FitConfig};
use crate::error::FitError;

/// Full width at half maximum in units of sigma.
pub const FWHM_PER_SIGMA: f64 = 2.35482;

/// Fitted `H + A exp(-(x - x0)^2 / (2σ^2))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    /// Constant baseline `H`.
    pub baseline: f64,
    /// Peak amplitude above the baseline `A`.
    pub amplitude: f64,
    /// Peak position `x0`.
    pub mean: f64,
    /// Width `σ`.
    pub sigma: f64,
}

impl GaussianFit {
    /// Evaluates the fitted curve.
    #[must_use]
    pub fn value(&self, x: f64) -> f64 {
        gauss(x, self.baseline, self.amplitude, self.mean, self.sigma)
    }

    /// Full width at half maximum.
    #[must_use]
    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * self.sigma.abs()
    }

    /// Fits binned `(x, y)` points.
    ///
    /// Seeded with `H = min(y)`, `A = max(y)` and the `y`-weighted mean and
    /// standard deviation of `x`.
    ///
    /// # Errors
    ///
    /// Returns `FitError::InsufficientData` when there are fewer than four points or
    /// no positive weight, otherwise any optimizer failure.
    pub fn fit(x: &[f64], y: &[f64], config: &FitConfig) -> Result<Self, FitError> {
        let n = x.len().min(y.len());
        let total: f64 = y[..n].iter().sum();
        if n < 4 || total <= 0.0 {
            return Err(FitError::InsufficientData { required: 4, actual: n });
        }
        let mean = x.iter().zip(y).map(|(x, y)| x * y).sum::<f64>() / total;
        let sigma = (x.iter().zip(y).map(|(x, y)| y * (x - mean).powi(2)).sum::<f64>() / total).sqrt();
        let baseline = y[..n].iter().copied().fold(f64::INFINITY, f64::min);
        let amplitude = y[..n].iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let model = |i: usize, p: &[f64]| gauss(x[i], p[0], p[1], p[2], p[3]);
        let solution = levenberg_marquardt(&y[..n], model, &[baseline, amplitude, mean, sigma], config)?;
        let p = &solution.params;
        Ok(Self {
            baseline: p[0],
            amplitude: p[1],
            mean: p[2],
            sigma: p[3].abs(),
        })
    }
}

fn gauss(x: f64, h: f64, a: f64, x0: f64, sigma: f64) -> f64 {
    h + a * (-(x - x0).powi(2) / (2.0 * sigma * sigma)).exp()
}
