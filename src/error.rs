//! Error types for muloss.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the stage that failed: input validation, execution, model fitting or
//! persistence.

use thiserror::Error;

/// Validation errors raised while reading or checking inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Column '{field}' has the wrong type: expected {expected}")]
    ColumnType {
        field: String,
        expected: &'static str,
    },

    #[error("Length mismatch for '{field}': expected {expected}, got {actual}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Chamber id {value} does not fit the packed identifier format")]
    InvalidChamberId {
        value: i64,
    },

    #[error("Degenerate geometry: pt={pt}, eta={eta} gives no finite momentum")]
    DegenerateGeometry {
        pt: f64,
        eta: f64,
    },

    #[error("Invalid axis '{axis}': {reason}")]
    InvalidAxis {
        axis: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    #[error("Invalid loss model: {reason}")]
    InvalidModel {
        reason: String,
    },

    #[error("Input '{what}' is empty")]
    EmptyInput {
        what: String,
    },
}

/// Execution errors raised while processing or merging batches.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Cannot merge '{metric}': axes differ")]
    IncompatibleAxes {
        metric: String,
    },

    #[error("Unknown axis '{axis}'")]
    UnknownAxis {
        axis: String,
    },

    #[error("Worker pool '{pool}' disconnected")]
    Disconnected {
        pool: String,
    },
}

/// Errors from the least-squares fit.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("Fit needs at least {required} points, got {actual}")]
    InsufficientData {
        required: usize,
        actual: usize,
    },

    #[error("Initial parameters give a non-finite cost")]
    NonFiniteCost,

    #[error("Normal equations are singular at iteration {iteration}")]
    Singular {
        iteration: usize,
    },

    #[error("Fit stalled before the first accepted step (damping {damping:e})")]
    Stalled {
        damping: f64,
    },

    #[error("Fit did not converge within {max_iterations} iterations")]
    NotConverged {
        max_iterations: usize,
    },
}

/// Persistence errors for fitted models.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt model file: {reason}")]
    Corrupt {
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Top-level error type for muloss.
#[derive(Debug, Error)]
pub enum MulossError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MulossError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a fit error.
    #[must_use]
    pub const fn is_fit(&self) -> bool {
        matches!(self, Self::Fit(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the failure came from the input rather than the pipeline.
    ///
    /// Input faults are fatal for the run; nothing downstream retries them.
    #[must_use]
    pub const fn is_input_fault(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Storage(e) => matches!(e, StorageError::Corrupt { .. }),
            _ => false,
        }
    }
}

/// Result type alias for muloss operations.
pub type MulossResult<T> = Result<T, MulossError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_missing_field() {
        let err = ValidationError::MissingField {
            field: "gen_pt".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("gen_pt"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_validation_error_length_mismatch() {
        let err = ValidationError::LengthMismatch {
            field: "sim_p".to_string(),
            expected: 3,
            actual: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("sim_p"));
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_fit_error_not_converged() {
        let err = FitError::NotConverged { max_iterations: 200 };
        assert!(format!("{err}").contains("200"));
    }

    #[test]
    fn test_execution_error_incompatible_axes() {
        let err = ExecutionError::IncompatibleAxes {
            metric: "p_loss".to_string(),
        };
        assert!(format!("{err}").contains("p_loss"));
    }

    #[test]
    fn test_muloss_error_from_validation() {
        let err: MulossError = ValidationError::EmptyInput {
            what: "samples".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(err.is_input_fault());
    }

    #[test]
    fn test_muloss_error_from_fit() {
        let err: MulossError = FitError::NonFiniteCost.into();
        assert!(err.is_fit());
        assert!(!err.is_input_fault());
    }

    #[test]
    fn test_muloss_error_from_storage() {
        let err: MulossError = StorageError::Corrupt {
            reason: "bad magic".to_string(),
        }
        .into();
        assert!(err.is_storage());
        assert!(err.is_input_fault());
    }

    #[test]
    fn test_muloss_error_internal() {
        let err = MulossError::internal("unexpected state");
        assert!(!err.is_execution());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
