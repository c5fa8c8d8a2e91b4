//! Analysis configuration.
//!
//! Every section has defaults matching the standard analysis, so an empty
//! TOML document is a valid configuration:
//!
//! ```toml
//! [association]
//! delta_r_cut = 0.2
//!
//! [association.selection]
//! particle_type = 13
//! station = 4
//!
//! [binning.loss]
//! bins = 100
//! low = 0.0
//! high = 400.0
//!
//! [estimator]
//! threshold = 1.0
//!
//! [executor]
//! workers = 4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::accumulator::BinningConfig;
use crate::association::{DeltaRMatcher, HitSelection, DR_CUT};
use crate::dataset::SplitConfig;
use crate::error::{MulossResult, StorageError, ValidationError};
use crate::estimator::EstimatorConfig;
use crate::model::FitConfig;
use crate::runtime::ExecutorConfig;
use crate::schema::EventSchema;

/// Association settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Matching cone in delta-R.
    pub delta_r_cut: f64,
    /// Hits eligible for exit-momentum extraction.
    pub selection: HitSelection,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            delta_r_cut: DR_CUT,
            selection: HitSelection::default(),
        }
    }
}

impl AssociationConfig {
    /// Matcher for the configured cone.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for a non-positive or non-finite cut.
    pub fn matcher(&self) -> Result<DeltaRMatcher, ValidationError> {
        DeltaRMatcher::new(self.delta_r_cut)
    }
}

/// Full analysis configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Column names of the input events.
    pub schema: EventSchema,
    /// Delta-R cone and hit selection.
    pub association: AssociationConfig,
    /// Histogram axes.
    pub binning: BinningConfig,
    /// Least-squares settings.
    pub fit: FitConfig,
    /// Momentum grid and interval threshold.
    pub estimator: EstimatorConfig,
    /// Worker pool sizing.
    pub executor: ExecutorConfig,
    /// Train/test split.
    pub split: SplitConfig,
}

impl AnalysisConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, ValidationError> {
        let config: Self = toml::from_str(text).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file cannot be read, or a `ValidationError`.
    pub fn load(path: impl AsRef<Path>) -> MulossResult<Self> {
        let text = std::fs::read_to_string(path).map_err(StorageError::from)?;
        Ok(Self::from_toml_str(&text)?)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError::InvalidConfig` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.association.matcher()?;
        self.binning.validate()?;
        self.fit.validate()?;
        self.estimator.validate()?;
        self.executor.validate()?;
        self.split.validate()?;
        Ok(())
    }
}
