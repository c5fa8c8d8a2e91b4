//! Calibration of the momentum estimator on held-out samples.
//!
//! A regression model predicts the momentum loss of each muon from its
//! detector features. The predicted loss goes through the estimator, and
//! the resulting interval is checked against the true momentum. The report
//! gives the coverage, the distribution of `(point - true) / (high - low)`
//! and a Gaussian fit of that distribution.

use serde::{Deserialize, Serialize};

use crate::accumulator::{Axis, Histogram};
use crate::dataset::MuonSample;
use crate::error::{FitError, ValidationError};
use crate::estimator::MomentumEstimator;
use crate::model::{FitConfig, GaussianFit};

/// Predicts momentum loss from detector features.
///
/// Features are ordered as in [`crate::dataset::FEATURE_NAMES`].
pub trait MomentumLossPredictor {
    /// Predicted momentum loss [GeV].
    fn predict(&self, features: &[f64]) -> f64;
}

impl<F> MomentumLossPredictor for F
where
    F: Fn(&[f64]) -> f64,
{
    fn predict(&self, features: &[f64]) -> f64 {
        self(features)
    }
}

/// A predicted loss paired with the true momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Generated momentum [GeV].
    pub p: f64,
    /// Predicted momentum loss [GeV].
    pub dp: f64,
}

/// Outcome for one held-out muon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Generated momentum [GeV].
    pub true_p: f64,
    /// Predicted momentum loss [GeV].
    pub predicted_dp: f64,
    /// Estimated momentum [GeV].
    pub point: f64,
    /// Lower interval bound, or the sentinel.
    pub low: f64,
    /// Upper interval bound.
    pub high: f64,
    /// True momentum lies in `[low, high]`.
    pub in_interval: bool,
}

/// Aggregate calibration results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// One record per input, in input order.
    pub records: Vec<CalibrationRecord>,
    /// Fraction of records with the true momentum inside the interval.
    pub fraction_in_interval: f64,
    /// Normalized residuals `(point - true) / (high - low)`.
    pub residuals: Histogram,
    /// Estimated against true momentum.
    pub predicted_vs_true: Histogram,
}

impl CalibrationReport {
    /// Gaussian fit of the normalized residual histogram.
    ///
    /// # Errors
    ///
    /// Returns a `FitError` if the histogram is empty or the fit fails.
    pub fn fit_residuals(&self, config: &FitConfig) -> Result<GaussianFit, FitError> {
        let centers = self.residuals.axes()[0].centers();
        let fit = GaussianFit::fit(&centers, &self.residuals.values(), config)?;
        log::info!(
            "residual fit: baseline={:.3} amplitude={:.3} center={:.4} sigma={:.4} fwhm={:.4}",
            fit.baseline,
            fit.amplitude,
            fit.mean,
            fit.sigma,
            fit.fwhm()
        );
        Ok(fit)
    }
}

/// Scores held-out samples with `predictor` and calibrates on the predictions.
///
/// # Errors
///
/// Returns `ValidationError::EmptyInput` if there are no samples.
pub fn calibrate<P>(
    estimator: &MomentumEstimator,
    predictor: &P,
    samples: &[MuonSample],
) -> Result<CalibrationReport, ValidationError>
where
    P: MomentumLossPredictor + ?Sized,
{
    let predictions: Vec<Prediction> = samples
        .iter()
        .map(|s| Prediction {
            p: s.p,
            dp: predictor.predict(&s.features),
        })
        .collect();
    calibrate_predictions(estimator, &predictions)
}

/// Runs the estimator on precomputed predictions.
///
/// Inconclusive estimates count as outside the interval and are left out of
/// the residual histogram, as are zero-width intervals.
///
/// # Errors
///
/// Returns `ValidationError::EmptyInput` if there are no predictions.
#[allow(clippy::cast_precision_loss)]
pub fn calibrate_predictions(
    estimator: &MomentumEstimator,
    predictions: &[Prediction],
) -> Result<CalibrationReport, ValidationError> {
    if predictions.is_empty() {
        return Err(ValidationError::EmptyInput {
            what: "predictions".to_string(),
        });
    }
    let mut residuals = Histogram::new(
        "res_norm",
        vec![Axis::regular("res_norm", "(p_reco - p_gen) / sigma_reco", 100, -3.0, 3.0)?],
    )?;
    let mut predicted_vs_true = Histogram::new(
        "predicted_vs_true",
        vec![
            Axis::regular("p", "True p [GeV]", 50, 0.0, 4000.0)?,
            Axis::regular("pred_p", "Predicted p [GeV]", 50, 0.0, 4000.0)?,
        ],
    )?;

    let mut records = Vec::with_capacity(predictions.len());
    let mut in_count = 0usize;
    for (count, prediction) in predictions.iter().enumerate() {
        if count % 1000 == 0 {
            log::debug!("calibration: completed {count}");
        }
        let estimate = estimator.estimate(prediction.dp);
        let in_interval = estimate.contains(prediction.p);
        if in_interval {
            in_count += 1;
        }
        if let Some(width) = estimate.width().filter(|w| *w > 0.0) {
            residuals.fill(&[(estimate.point - prediction.p) / width], 1.0)?;
            predicted_vs_true.fill(&[prediction.p, estimate.point], 1.0)?;
        }
        records.push(CalibrationRecord {
            true_p: prediction.p,
            predicted_dp: prediction.dp,
            point: estimate.point,
            low: estimate.low,
            high: estimate.high,
            in_interval,
        });
    }

    let fraction_in_interval = in_count as f64 / predictions.len() as f64;
    log::info!("fraction in interval: {fraction_in_interval:.4} ({in_count}/{})", predictions.len());
    Ok(CalibrationReport {
        records,
        fraction_in_interval,
        residuals,
        predicted_vs_true,
    })
}
