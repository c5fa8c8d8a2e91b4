//! On-disk record of a fitted loss model.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::{decode, encode, read_header, write_header};
use crate::error::{StorageError, ValidationError};
use crate::model::{FitOutcome, FittedModel};

/// Unique identifier of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(Uuid);

impl ModelId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frozen model plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    /// Model identifier.
    pub model_id: ModelId,
    /// When the fit finished.
    pub fitted_at: DateTime<Utc>,
    /// BLAKE3 digest of the fitted observations.
    pub dataset_digest: String,
    /// Sum of squared residuals.
    pub chi_square: f64,
    /// Degrees of freedom.
    pub dof: usize,
    /// The frozen parameters.
    pub model: FittedModel,
}

impl PersistedModel {
    /// Freezes a fit outcome and stamps it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidModel` if the parameters cannot be frozen.
    pub fn from_outcome(outcome: &FitOutcome) -> Result<Self, ValidationError> {
        Ok(Self {
            model_id: ModelId::new(),
            fitted_at: Utc::now(),
            dataset_digest: outcome.dataset_digest.clone(),
            chi_square: outcome.chi_square,
            dof: outcome.dof,
            model: outcome.freeze()?,
        })
    }
}

/// Writes the record atomically: a temporary sibling is synced, then renamed.
/// On failure the temporary file is removed and `path` is left untouched.
///
/// # Errors
///
/// Returns `StorageError::Io` or `StorageError::Serialization`.
pub fn save_model(path: impl AsRef<Path>, record: &PersistedModel) -> Result<(), StorageError> {
    let path = path.as_ref();
    let tmp = path.with_extension("tmp");
    if let Err(err) = write_then_rename(&tmp, path, record) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    log::info!("saved model {} to {}", record.model_id, path.display());
    Ok(())
}

fn write_then_rename(tmp: &Path, path: &Path, record: &PersistedModel) -> Result<(), StorageError> {
    {
        let mut file = File::create(tmp)?;
        write_header(&mut file)?;
        file.write_all(&encode(record)?)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}

/// Reads a record written by [`save_model`].
///
/// # Errors
///
/// Returns `StorageError::Corrupt` for bad magic, version or checksum,
/// `StorageError::Io` for unreadable or truncated files.
pub fn load_model(path: impl AsRef<Path>) -> Result<PersistedModel, StorageError> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    read_header(&mut reader)?;
    let record: PersistedModel = decode(&mut reader)?;
    log::debug!("loaded model {} from {}", record.model_id, path.as_ref().display());
    Ok(record)
}
