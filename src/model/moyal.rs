//! Moyal density and the momentum-dependent loss model.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Moyal probability density at `x`.
///
/// `exp(-(y + exp(-y)) / 2) / (sqrt(2π) · scale)` with `y = (x - loc) / scale`.
#[must_use]
pub fn moyal_pdf(x: f64, loc: f64, scale: f64) -> f64 {
    let y = (x - loc) / scale;
    (-(y + (-y).exp()) / 2.0).exp() / ((2.0 * PI).sqrt() * scale)
}

/// Parameters of the loss density.
///
/// At momentum `p` the loss follows a Moyal distribution with
/// `loc = offset + slope_mean · p` and `scale = slope_scale · p`, scaled by `norm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossParameters {
    /// Location at zero momentum [GeV].
    pub offset: f64,
    /// Location growth per GeV of momentum.
    pub slope_mean: f64,
    /// Scale growth per GeV of momentum.
    pub slope_scale: f64,
    /// Overall normalization.
    pub norm: f64,
}

impl LossParameters {
    /// Parameter vector in fit order.
    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.offset, self.slope_mean, self.slope_scale, self.norm]
    }

    /// Inverse of [`Self::to_array`].
    #[must_use]
    pub const fn from_array(values: [f64; 4]) -> Self {
        Self {
            offset: values[0],
            slope_mean: values[1],
            slope_scale: values[2],
            norm: values[3],
        }
    }

    /// Loss density `norm · Moyal(dp; offset + slope_mean·p, slope_scale·p)`.
    #[must_use]
    pub fn density(&self, dp: f64, p: f64) -> f64 {
        self.norm * moyal_pdf(dp, self.offset + self.slope_mean * p, self.slope_scale * p)
    }
}

/// A frozen, immutable loss model consumed by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LossParameters", into = "LossParameters")]
pub struct FittedModel {
    params: LossParameters,
}

impl FittedModel {
    /// Freezes a parameter set.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidModel` unless every parameter is finite
    /// and both `slope_scale` and `norm` are positive.
    pub fn new(params: LossParameters) -> Result<Self, ValidationError> {
        if params.to_array().iter().any(|v| !v.is_finite()) || params.slope_scale <= 0.0 || params.norm <= 0.0 {
            return Err(ValidationError::InvalidModel {
                reason: format!("loss model needs finite parameters, slope_scale > 0 and norm > 0 (got {params:?})"),
            });
        }
        Ok(Self { params })
    }

    /// Frozen parameters.
    #[must_use]
    pub const fn params(&self) -> LossParameters {
        self.params
    }

    /// Loss density at (`dp`, `p`).
    #[must_use]
    pub fn density(&self, dp: f64, p: f64) -> f64 {
        self.params.density(dp, p)
    }
}

impl TryFrom<LossParameters> for FittedModel {
    type Error = ValidationError;

    fn try_from(params: LossParameters) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<FittedModel> for LossParameters {
    fn from(model: FittedModel) -> Self {
        model.params
    }
}
