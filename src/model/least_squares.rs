//! Levenberg–Marquardt nonlinear least squares.
//!
//! The engine minimizes `sum_i (model(i, θ) - y_i)^2` over a small parameter
//! vector. The Jacobian is taken by central differences and each step solves
//! the Marquardt-scaled normal equations `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, ValidationError};

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;
const DAMPING_FACTOR: f64 = 10.0;
const RELATIVE_STEP: f64 = 1e-6;
const MIN_STEP: f64 = 1e-8;

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Outer iterations before giving up.
    pub max_iterations: usize,
    /// Converged once an accepted step lowers the cost by less than this fraction.
    pub tolerance: f64,
    /// Starting damping λ.
    pub initial_damping: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

impl FitConfig {
    /// Checks that all settings are positive.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_iterations == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "fit max_iterations must be > 0".to_string(),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("fit tolerance must be finite and > 0 (got {})", self.tolerance),
            });
        }
        if !(self.initial_damping.is_finite() && self.initial_damping > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("fit initial_damping must be finite and > 0 (got {})", self.initial_damping),
            });
        }
        Ok(())
    }
}

/// Result of a converged fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresSolution {
    /// Best-fit parameters.
    pub params: Vec<f64>,
    /// One-sigma uncertainties from `(JᵀJ)⁻¹ · cost / dof`; `None` if not invertible.
    pub uncertainties: Option<Vec<f64>>,
    /// Sum of squared residuals at the solution.
    pub cost: f64,
    /// Observations minus parameters.
    pub dof: usize,
    /// Accepted steps taken.
    pub iterations: usize,
}

/// Fits `model(i, θ)` to `targets[i]` starting from `initial`.
///
/// # Errors
///
/// - `InsufficientData` if there are fewer observations than parameters
/// - `NonFiniteCost` if the starting point does not evaluate
/// - `Singular` if the damped normal matrix cannot be solved
/// - `Stalled` if no step ever lowers the cost
/// - `NotConverged` if `max_iterations` is reached
#[allow(clippy::float_cmp)]
pub fn levenberg_marquardt<F>(
    targets: &[f64],
    model: F,
    initial: &[f64],
    config: &FitConfig,
) -> Result<LeastSquaresSolution, FitError>
where
    F: Fn(usize, &[f64]) -> f64,
{
    let n_obs = targets.len();
    let n_params = initial.len();
    if n_obs < n_params || n_params == 0 {
        return Err(FitError::InsufficientData {
            required: n_params.max(1),
            actual: n_obs,
        });
    }

    let residuals = |params: &[f64]| -> DVector<f64> {
        DVector::from_iterator(n_obs, (0..n_obs).map(|i| model(i, params) - targets[i]))
    };

    let mut params = initial.to_vec();
    let mut r = residuals(&params);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(FitError::NonFiniteCost);
    }

    let mut damping = config.initial_damping;
    let mut accepted = 0usize;

    for iteration in 1..=config.max_iterations {
        if cost == 0.0 {
            break;
        }
        let jac = jacobian(&residuals, &params, n_obs);
        let jtj = jac.transpose() * &jac;
        let gradient = jac.transpose() * &r;

        loop {
            let mut system = jtj.clone();
            for k in 0..n_params {
                system[(k, k)] += damping * jtj[(k, k)].max(MIN_DAMPING);
            }
            let step = system
                .lu()
                .solve(&(-&gradient))
                .filter(|s| s.iter().all(|v| v.is_finite()))
                .ok_or(FitError::Singular { iteration })?;

            let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, d)| p + d).collect();
            let trial_r = residuals(&trial);
            let trial_cost = trial_r.norm_squared();

            if trial_cost.is_finite() && trial_cost < cost {
                let improvement = (cost - trial_cost) / cost;
                params = trial;
                r = trial_r;
                cost = trial_cost;
                accepted += 1;
                damping = (damping / DAMPING_FACTOR).max(MIN_DAMPING);
                if improvement < config.tolerance {
                    return Ok(solution(&residuals, params, cost, n_obs, accepted));
                }
                break;
            }

            damping *= DAMPING_FACTOR;
            if damping > MAX_DAMPING {
                // No further descent is possible from an accepted point.
                if accepted > 0 {
                    return Ok(solution(&residuals, params, cost, n_obs, accepted));
                }
                return Err(FitError::Stalled { damping });
            }
        }
    }

    if cost == 0.0 {
        return Ok(solution(&residuals, params, cost, n_obs, accepted));
    }
    Err(FitError::NotConverged {
        max_iterations: config.max_iterations,
    })
}

fn jacobian<R>(residuals: &R, params: &[f64], n_obs: usize) -> DMatrix<f64>
where
    R: Fn(&[f64]) -> DVector<f64>,
{
    let mut jac = DMatrix::zeros(n_obs, params.len());
    let mut shifted = params.to_vec();
    for k in 0..params.len() {
        let h = (params[k].abs() * RELATIVE_STEP).max(MIN_STEP);
        shifted[k] = params[k] + h;
        let up = residuals(&shifted);
        shifted[k] = params[k] - h;
        let down = residuals(&shifted);
        shifted[k] = params[k];
        jac.set_column(k, &((up - down) / (2.0 * h)));
    }
    jac
}

#[allow(clippy::cast_precision_loss)]
fn solution<R>(residuals: &R, params: Vec<f64>, cost: f64, n_obs: usize, iterations: usize) -> LeastSquaresSolution
where
    R: Fn(&[f64]) -> DVector<f64>,
{
    let dof = n_obs - params.len();
    let jac = jacobian(residuals, &params, n_obs);
    let uncertainties = (jac.transpose() * &jac).try_inverse().and_then(|inv| {
        let scale = if dof > 0 { cost / dof as f64 } else { 1.0 };
        let sigmas: Vec<f64> = (0..params.len()).map(|k| (inv[(k, k)] * scale).sqrt()).collect();
        sigmas.iter().all(|s| s.is_finite()).then_some(sigmas)
    });
    LeastSquaresSolution {
        params,
        uncertainties,
        cost,
        dof,
        iterations,
    }
}
