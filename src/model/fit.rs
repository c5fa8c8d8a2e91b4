//! Fitting the loss model to the aggregated (p, dp) histogram.
//!
//! The model moves through three states: a [`MomentumLossFit`] holds the
//! unfit observations, [`MomentumLossFit::fit`] yields a [`FitOutcome`], and
//! [`FitOutcome::freeze`] produces the immutable [`FittedModel`].

use std::f64::consts::{LN_2, PI, SQRT_2};

use serde::{Deserialize, Serialize};

use super::least_squares::{levenberg_marquardt, FitConfig};
use super::moyal::{FittedModel, LossParameters};
use crate::accumulator::Histogram;
use crate::error::{ExecutionError, FitError, ValidationError};

/// Euler–Mascheroni constant.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// One observation: histogram weight at (dp, p).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossObservation {
    /// Momentum-loss bin center [GeV].
    pub dp: f64,
    /// Momentum bin center [GeV].
    pub p: f64,
    /// Entries in the bin.
    pub weight: f64,
}

/// Unfit observations of the loss distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumLossFit {
    observations: Vec<LossObservation>,
}

impl MomentumLossFit {
    /// Reshapes the (p, dp) bin contents of `histogram` into observations.
    ///
    /// Any other axes are projected out. Observations are ordered with dp as the
    /// outer and p as the inner index.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnknownAxis` if `p` or `dp` is missing.
    pub fn from_histogram(histogram: &Histogram) -> Result<Self, ExecutionError> {
        let projected = histogram.project(&["p", "dp"])?;
        let p_centers = projected.axes()[0].centers();
        let dp_centers = projected.axes()[1].centers();
        let mut observations = Vec::with_capacity(p_centers.len() * dp_centers.len());
        for (j, &dp) in dp_centers.iter().enumerate() {
            for (i, &p) in p_centers.iter().enumerate() {
                let weight = projected.bin(&[i, j]).unwrap_or(0.0);
                observations.push(LossObservation { dp, p, weight });
            }
        }
        Ok(Self { observations })
    }

    /// Wraps observations directly.
    #[must_use]
    pub fn from_observations(observations: Vec<LossObservation>) -> Self {
        Self { observations }
    }

    /// Observations in fit order.
    #[must_use]
    pub fn observations(&self) -> &[LossObservation] {
        &self.observations
    }

    /// BLAKE3 digest of the observations, hex encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for obs in &self.observations {
            hasher.update(&obs.dp.to_le_bytes());
            hasher.update(&obs.p.to_le_bytes());
            hasher.update(&obs.weight.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Starting point derived from per-momentum moments of the data.
    ///
    /// For each momentum slice the weighted mean and standard deviation of dp
    /// are taken. A line through the means gives the location intercept and
    /// slope; a Moyal variable has mean `loc + (γ + ln 2)·scale` and standard
    /// deviation `π/√2 · scale`, which fixes `slope_scale` and corrects
    /// `slope_mean`.
    ///
    /// # Errors
    ///
    /// Returns `FitError::InsufficientData` if fewer than two momentum slices hold entries.
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn seed(&self) -> Result<LossParameters, FitError> {
        let mut momenta: Vec<f64> = self.observations.iter().map(|o| o.p).collect();
        momenta.sort_by(f64::total_cmp);
        momenta.dedup();

        let mut slices = Vec::new();
        let mut total_weight = 0.0;
        for &p in &momenta {
            let (mut w, mut sum, mut sum_sq) = (0.0, 0.0, 0.0);
            for obs in self.observations.iter().filter(|o| o.p == p && o.weight > 0.0) {
                w += obs.weight;
                sum += obs.weight * obs.dp;
                sum_sq += obs.weight * obs.dp * obs.dp;
            }
            if w > 0.0 && p > 0.0 {
                let mean = sum / w;
                let std = (sum_sq / w - mean * mean).max(0.0).sqrt();
                slices.push((p, mean, std));
                total_weight += w;
            }
        }
        if slices.len() < 2 {
            return Err(FitError::InsufficientData {
                required: 2,
                actual: slices.len(),
            });
        }

        let n = slices.len() as f64;
        let p_mean = slices.iter().map(|s| s.0).sum::<f64>() / n;
        let m_mean = slices.iter().map(|s| s.1).sum::<f64>() / n;
        let sxx: f64 = slices.iter().map(|s| (s.0 - p_mean).powi(2)).sum();
        let sxy: f64 = slices.iter().map(|s| (s.0 - p_mean) * (s.1 - m_mean)).sum();
        let slope = sxy / sxx;
        let intercept = m_mean - slope * p_mean;

        let slope_scale = slices.iter().map(|s| s.2 / s.0).sum::<f64>() / n / (PI / SQRT_2);
        let slope_mean = slope - (EULER_GAMMA + LN_2) * slope_scale;

        let mut losses: Vec<f64> = self.observations.iter().map(|o| o.dp).collect();
        losses.sort_by(f64::total_cmp);
        losses.dedup();
        let bin_width = if losses.len() > 1 { losses[1] - losses[0] } else { 1.0 };

        Ok(LossParameters {
            offset: intercept,
            slope_mean,
            slope_scale,
            norm: total_weight / n * bin_width,
        })
    }

    /// Nonlinear least squares of the loss density against the bin weights.
    ///
    /// # Errors
    ///
    /// Any optimizer failure is returned as a `FitError`; there is no fallback.
    pub fn fit(&self, initial: LossParameters, config: &FitConfig) -> Result<FitOutcome, FitError> {
        let weights: Vec<f64> = self.observations.iter().map(|o| o.weight).collect();
        let model = |i: usize, theta: &[f64]| {
            let obs = &self.observations[i];
            LossParameters::from_array([theta[0], theta[1], theta[2], theta[3]]).density(obs.dp, obs.p)
        };
        let solution = levenberg_marquardt(&weights, model, &initial.to_array(), config)?;

        let params = LossParameters::from_array([
            solution.params[0],
            solution.params[1],
            solution.params[2],
            solution.params[3],
        ]);
        log::info!(
            "loss fit converged after {} steps: offset={:.4} slope_mean={:.6} slope_scale={:.6} norm={:.2} chi2/dof={:.3}",
            solution.iterations,
            params.offset,
            params.slope_mean,
            params.slope_scale,
            params.norm,
            reduced(solution.cost, solution.dof)
        );
        Ok(FitOutcome {
            params,
            uncertainties: solution
                .uncertainties
                .map(|u| LossParameters::from_array([u[0], u[1], u[2], u[3]])),
            chi_square: solution.cost,
            dof: solution.dof,
            iterations: solution.iterations,
            dataset_digest: self.digest(),
        })
    }

    /// Seeds from the data and fits.
    ///
    /// # Errors
    ///
    /// See [`Self::seed`] and [`Self::fit`].
    pub fn fit_from_seed(&self, config: &FitConfig) -> Result<FitOutcome, FitError> {
        let seed = self.seed()?;
        log::debug!("loss fit seed: {seed:?}");
        self.fit(seed, config)
    }
}

#[allow(clippy::cast_precision_loss)]
fn reduced(chi_square: f64, dof: usize) -> f64 {
    if dof == 0 {
        f64::NAN
    } else {
        chi_square / dof as f64
    }
}

/// A converged fit, not yet frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    /// Best-fit parameters.
    pub params: LossParameters,
    /// One-sigma uncertainties, when the covariance is available.
    pub uncertainties: Option<LossParameters>,
    /// Sum of squared residuals.
    pub chi_square: f64,
    /// Degrees of freedom.
    pub dof: usize,
    /// Accepted optimizer steps.
    pub iterations: usize,
    /// BLAKE3 digest of the fitted observations.
    pub dataset_digest: String,
}

impl FitOutcome {
    /// `chi_square / dof`.
    #[must_use]
    pub fn reduced_chi_square(&self) -> f64 {
        reduced(self.chi_square, self.dof)
    }

    /// Freezes the parameters into a model.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidModel` if the fit ended on a non-physical scale or norm.
    pub fn freeze(&self) -> Result<FittedModel, ValidationError> {
        FittedModel::new(self.params)
    }
}
