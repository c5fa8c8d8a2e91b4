//! Flat muon samples and the deterministic train/test split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Names of [`MuonSample::features`], in order.
pub const FEATURE_NAMES: [&str; 4] = ["eta", "phi", "log_hcal", "log_ecal"];

/// One selected muon as a regression row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuonSample {
    /// Generated momentum [GeV].
    pub p: f64,
    /// Momentum loss before the outermost station [GeV].
    pub dp: f64,
    /// `eta`, `phi`, `log10(hcal energy)`, `log10(ecal energy)`.
    pub features: [f64; 4],
}

/// Train/test split settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows kept for training.
    pub train_fraction: f64,
    /// Shuffle seed.
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            seed: 1,
        }
    }
}

impl SplitConfig {
    /// Checks that the fraction lies in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.train_fraction) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("train_fraction must lie in [0, 1] (got {})", self.train_fraction),
            });
        }
        Ok(())
    }
}

/// Shuffles with the configured seed and splits into `(train, test)`.
///
/// The training side gets `train_fraction * n` rows rounded half to even
/// (11 rows at 0.8 give 9 / 2), the test side the rest. The same seed and
/// input always give the same split.
///
/// # Errors
///
/// Returns `ValidationError::InvalidConfig` for an out-of-range fraction.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn train_test_split(
    samples: &[MuonSample],
    config: &SplitConfig,
) -> Result<(Vec<MuonSample>, Vec<MuonSample>), ValidationError> {
    config.validate()?;
    let mut shuffled = samples.to_vec();
    let mut rng = StdRng::seed_from_u64(config.seed);
    shuffled.shuffle(&mut rng);

    let n = shuffled.len();
    let n_train = ((config.train_fraction * n as f64).round_ties_even() as usize).min(n);
    let test = shuffled.split_off(n_train);
    Ok((shuffled, test))
}
