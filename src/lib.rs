//! # muloss - muon momentum-loss analysis
//!
//! muloss associates generated muons with calorimeter deposits and chamber
//! hits, aggregates the momentum lost before the outermost muon station,
//! fits a momentum-dependent Moyal model to that loss, and inverts the model
//! into a likelihood for momentum with confidence intervals.
//!
//! ## Pipeline
//!
//! ```text
//! EventBatch ─► EventSchema::materialize ─► DeltaRMatcher / ExitMomentumExtractor
//!            ─► RunAccumulator (per batch) ─► merge ─► MomentumLossFit ─► FittedModel
//!            ─► MomentumEstimator ─► calibrate
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use muloss::{AnalysisConfig, MomentumLossFit, MomentumLossProcessor, PartitionExecutor};
//!
//! let config = AnalysisConfig::default();
//! let executor = PartitionExecutor::new(MomentumLossProcessor::from_config(&config)?, config.executor);
//! let run = executor.run(batches)?;
//!
//! let outcome = MomentumLossFit::from_histogram(&run.p_loss)?.fit_from_seed(&config.fit)?;
//! let model = outcome.freeze()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Inputs and geometry
pub mod error;
pub mod event;
pub mod geometry;
pub mod schema;

// Association and aggregation
pub mod accumulator;
pub mod association;
pub mod processor;
pub mod runtime;

// Model, estimation and calibration
pub mod calibration;
pub mod dataset;
pub mod estimator;
pub mod model;
pub mod storage;

pub mod config;

pub use accumulator::{Accumulator, Axis, BinningConfig, Counter, Histogram, RunAccumulator, SampleColumns};
pub use association::{
    delta_r, DeltaRMatcher, Direction, EnergySum, ExitMomentumExtractor, HitSelection, LastMatch, DR_CUT,
    NO_ENERGY, NO_EXIT_MOMENTUM,
};
pub use calibration::{calibrate, calibrate_predictions, CalibrationReport, MomentumLossPredictor, Prediction};
pub use config::{AnalysisConfig, AssociationConfig};
pub use dataset::{train_test_split, MuonSample, SplitConfig};
pub use error::{ExecutionError, FitError, MulossError, MulossResult, StorageError, ValidationError};
pub use estimator::{EstimatorConfig, IntervalEstimate, MomentumEstimator, MomentumGrid, NO_BOUND};
pub use event::{CaloDeposit, Event, GeneratedParticle, SimHit};
pub use geometry::ChamberId;
pub use model::{FitConfig, FitOutcome, FittedModel, LossParameters, MomentumLossFit};
pub use processor::MomentumLossProcessor;
pub use runtime::{run_iterative, ExecutorConfig, PartitionExecutor};
pub use schema::{EventBatch, EventSchema, RawEvent};
pub use storage::{load_model, save_model, ModelId, PersistedModel};
