//! Momentum-loss model: Moyal density, least-squares engine and fits.

mod fit;
mod gaussian;
mod least_squares;
mod moyal;

pub use fit::{FitOutcome, LossObservation, MomentumLossFit};
pub use gaussian::{GaussianFit, FWHM_PER_SIGMA};
pub use least_squares::{levenberg_marquardt, FitConfig, LeastSquaresSolution};
pub use moyal::{moyal_pdf, FittedModel, LossParameters};
