//! Likelihood-based momentum estimation.
//!
//! For an observed (or predicted) momentum loss the frozen model is read as a
//! likelihood over candidate momenta. The profile `-2 ln L(p)` is shifted so
//! its minimum is zero; the point estimate is the argmin and the interval is
//! where the profile stays at or below a threshold (1.0 for 68%, 3.84 for 95%).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::FittedModel;

/// Sentinel for a bound that was not found.
pub const NO_BOUND: f64 = -999.0;

/// Candidate momenta, strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumGrid {
    points: Vec<f64>,
}

impl MomentumGrid {
    /// `min, min + step, ...` up to but excluding `max`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for a non-positive step or an empty range.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn range(min: f64, max: f64, step: f64) -> Result<Self, ValidationError> {
        if !(min.is_finite() && max.is_finite() && step.is_finite() && step > 0.0 && min < max) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("momentum grid needs finite min < max and step > 0 (got {min}..{max} step {step})"),
            });
        }
        let n = ((max - min) / step).ceil() as usize;
        let points = (0..n).map(|i| min + step * i as f64).filter(|p| *p < max).collect();
        Self::from_points(points)
    }

    /// Grid from explicit points.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` unless the points are non-empty,
    /// finite and strictly increasing.
    pub fn from_points(points: Vec<f64>) -> Result<Self, ValidationError> {
        if points.is_empty() || points.iter().any(|p| !p.is_finite()) || points.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ValidationError::InvalidConfig {
                reason: "momentum grid must be non-empty, finite and strictly increasing".to_string(),
            });
        }
        Ok(Self { points })
    }

    /// Candidate momenta.
    #[must_use]
    pub fn points(&self) -> &[f64] {
        &self.points
    }
}

/// Estimator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// First candidate momentum [GeV].
    pub grid_min: f64,
    /// Exclusive end of the candidate range [GeV].
    pub grid_max: f64,
    /// Spacing of candidates [GeV].
    pub grid_step: f64,
    /// Profile threshold defining the interval.
    pub threshold: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            grid_min: 10.0,
            grid_max: 4000.0,
            grid_step: 10.0,
            threshold: 1.0,
        }
    }
}

impl EstimatorConfig {
    /// The configured candidate grid.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an empty grid.
    pub fn grid(&self) -> Result<MomentumGrid, ValidationError> {
        MomentumGrid::range(self.grid_min, self.grid_max, self.grid_step)
    }

    /// Checks the grid and threshold.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an empty grid or a non-positive threshold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.grid()?;
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("interval threshold must be finite and > 0 (got {})", self.threshold),
            });
        }
        Ok(())
    }
}

/// Point estimate and interval, with [`NO_BOUND`] for bounds not found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalEstimate {
    /// Momentum at the profile minimum.
    pub point: f64,
    /// Lower bound.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
}

impl IntervalEstimate {
    /// True if both the point and the lower bound were found.
    #[allow(clippy::float_cmp)]
    #[must_use]
    pub fn is_conclusive(&self) -> bool {
        self.point != NO_BOUND && self.low != NO_BOUND
    }

    /// `(low, high)` for conclusive estimates.
    #[must_use]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.is_conclusive().then_some((self.low, self.high))
    }

    /// Interval width for conclusive estimates.
    #[must_use]
    pub fn width(&self) -> Option<f64> {
        self.bounds().map(|(low, high)| high - low)
    }

    /// True if `p` lies in `[low, high]`; always false when inconclusive.
    #[must_use]
    pub fn contains(&self, p: f64) -> bool {
        self.bounds().is_some_and(|(low, high)| low <= p && p <= high)
    }
}

/// A shifted `-2 ln L` profile over candidate momenta.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodProfile {
    momenta: Vec<f64>,
    values: Vec<f64>,
}

impl LikelihoodProfile {
    /// Evaluates `-2 ln density(dp, p)` on the grid and shifts the minimum to zero.
    ///
    /// Zero density gives `+∞`. If no finite value exists the profile is left unshifted.
    #[must_use]
    pub fn scan(model: &FittedModel, dp: f64, grid: &MomentumGrid) -> Self {
        let values = grid.points().iter().map(|&p| -2.0 * model.density(dp, p).ln()).collect();
        Self::shifted(grid.points().to_vec(), values)
    }

    /// Profile from precomputed `-2 ln L` values, shifted so the minimum is zero.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::LengthMismatch` if the two slices differ in length.
    pub fn from_values(momenta: Vec<f64>, values: Vec<f64>) -> Result<Self, ValidationError> {
        if momenta.len() != values.len() {
            return Err(ValidationError::LengthMismatch {
                field: "profile".to_string(),
                expected: momenta.len(),
                actual: values.len(),
            });
        }
        Ok(Self::shifted(momenta, values))
    }

    fn shifted(momenta: Vec<f64>, mut values: Vec<f64>) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            for v in &mut values {
                *v -= min;
            }
        }
        Self { momenta, values }
    }

    /// Candidate momenta.
    #[must_use]
    pub fn momenta(&self) -> &[f64] {
        &self.momenta
    }

    /// Shifted profile values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Point estimate and interval for `threshold`.
    ///
    /// Scanning left to right, `low` is the first momentum whose value is at or
    /// below the threshold and `high` the momentum just before the profile next
    /// rises above it. If it never rises again `high` is the last grid point.
    /// NaN values satisfy neither comparison.
    #[must_use]
    pub fn interval(&self, threshold: f64) -> IntervalEstimate {
        let point = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(NO_BOUND, |(i, _)| self.momenta[i]);

        let mut low = NO_BOUND;
        let mut high = NO_BOUND;
        let mut below = false;
        for (i, &value) in self.values.iter().enumerate() {
            if !below && value <= threshold {
                low = self.momenta[i];
                below = true;
            }
            if below && value > threshold {
                high = self.momenta[i - 1];
                break;
            }
        }
        if !below || high == NO_BOUND {
            high = self.momenta.last().copied().unwrap_or(NO_BOUND);
        }
        IntervalEstimate { point, low, high }
    }
}

/// Estimates momentum from a momentum loss with a frozen model.
#[derive(Debug, Clone)]
pub struct MomentumEstimator {
    model: FittedModel,
    grid: MomentumGrid,
    threshold: f64,
}

impl MomentumEstimator {
    /// Estimator over the configured grid and threshold.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an invalid configuration.
    pub fn new(model: FittedModel, config: &EstimatorConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            model,
            grid: config.grid()?,
            threshold: config.threshold,
        })
    }

    /// The frozen model.
    #[must_use]
    pub const fn model(&self) -> &FittedModel {
        &self.model
    }

    /// The shifted profile for `dp`.
    #[must_use]
    pub fn profile(&self, dp: f64) -> LikelihoodProfile {
        LikelihoodProfile::scan(&self.model, dp, &self.grid)
    }

    /// Point estimate and interval for `dp`.
    #[must_use]
    pub fn estimate(&self, dp: f64) -> IntervalEstimate {
        self.profile(dp).interval(self.threshold)
    }
}
