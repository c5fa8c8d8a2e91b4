//! Run-level accumulators with a merge-associative discipline.
//!
//! Every batch produces its own [`RunAccumulator`]. Partials are combined
//! with [`Accumulator::merge`], which is associative and commutative:
//! counts and histograms add, flat sample columns concatenate (and compare
//! as multisets). Merging partials from disjoint event subsets gives the
//! same result as processing their union.

mod histogram;

pub use histogram::{Axis, Histogram};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::MuonSample;
use crate::error::{ExecutionError, ValidationError};

/// Cutflow key: generated muons seen.
pub const CUT_MUONS: &str = "muons";
/// Cutflow key: muons with a measured exit momentum.
pub const CUT_EXIT_MOMENTUM: &str = "exit_momentum";
/// Cutflow key: ... and a non-zero hadronic deposit.
pub const CUT_HCAL_ENERGY: &str = "hcal_energy";
/// Cutflow key: ... and a non-zero electromagnetic deposit (the selection).
pub const CUT_ECAL_ENERGY: &str = "ecal_energy";

/// A mergeable partial result.
pub trait Accumulator: Sized {
    /// Empty accumulator of the same shape; the merge identity.
    #[must_use]
    fn identity(&self) -> Self;

    /// Folds `other` into `self`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::IncompatibleAxes` if the shapes differ.
    fn merge(&mut self, other: &Self) -> Result<(), ExecutionError>;

    /// By-value form of [`Accumulator::merge`].
    ///
    /// # Errors
    ///
    /// See [`Accumulator::merge`].
    fn merged(mut self, other: &Self) -> Result<Self, ExecutionError> {
        self.merge(other)?;
        Ok(self)
    }
}

impl Accumulator for Histogram {
    fn identity(&self) -> Self {
        self.empty_like()
    }

    fn merge(&mut self, other: &Self) -> Result<(), ExecutionError> {
        Histogram::merge(self, other)
    }
}

/// Named scalar counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counter(BTreeMap<String, u64>);

impl Counter {
    /// Adds `n` to `key`.
    pub fn add(&mut self, key: &str, n: u64) {
        *self.0.entry(key.to_string()).or_insert(0) += n;
    }

    /// Current value of `key`, zero if never counted.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Sum over all keys.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Keys and counts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Accumulator for Counter {
    fn identity(&self) -> Self {
        Self::default()
    }

    fn merge(&mut self, other: &Self) -> Result<(), ExecutionError> {
        for (key, n) in other.iter() {
            self.add(key, n);
        }
        Ok(())
    }
}

/// Flat per-muon columns for the selected sample.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleColumns {
    pub p: Vec<f64>,
    pub dp: Vec<f64>,
    pub eta: Vec<f64>,
    pub phi: Vec<f64>,
    pub log_hcal: Vec<f64>,
    pub log_ecal: Vec<f64>,
}

impl SampleColumns {
    /// Appends one row.
    pub fn push(&mut self, sample: &MuonSample) {
        let [eta, phi, log_hcal, log_ecal] = sample.features;
        self.p.push(sample.p);
        self.dp.push(sample.dp);
        self.eta.push(eta);
        self.phi.push(phi);
        self.log_hcal.push(log_hcal);
        self.log_ecal.push(log_ecal);
    }

    /// Number of complete rows; ragged columns count up to the shortest.
    #[must_use]
    pub fn len(&self) -> usize {
        [&self.p, &self.dp, &self.eta, &self.phi, &self.log_hcal, &self.log_ecal]
            .into_iter()
            .map(Vec::len)
            .min()
            .unwrap_or(0)
    }

    /// True if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete rows in storage order.
    pub fn rows(&self) -> impl Iterator<Item = MuonSample> + '_ {
        self.p
            .iter()
            .zip(&self.dp)
            .zip(&self.eta)
            .zip(&self.phi)
            .zip(&self.log_hcal)
            .zip(&self.log_ecal)
            .map(|(((((&p, &dp), &eta), &phi), &log_hcal), &log_ecal)| MuonSample {
                p,
                dp,
                features: [eta, phi, log_hcal, log_ecal],
            })
    }
}

impl Accumulator for SampleColumns {
    fn identity(&self) -> Self {
        Self::default()
    }

    fn merge(&mut self, other: &Self) -> Result<(), ExecutionError> {
        self.p.extend_from_slice(&other.p);
        self.dp.extend_from_slice(&other.dp);
        self.eta.extend_from_slice(&other.eta);
        self.phi.extend_from_slice(&other.phi);
        self.log_hcal.extend_from_slice(&other.log_hcal);
        self.log_ecal.extend_from_slice(&other.log_ecal);
        Ok(())
    }
}

/// Equal-width binning; for log axes `low`/`high` are base-10 exponents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge (or exponent).
    pub low: f64,
    /// Upper edge (or exponent).
    pub high: f64,
}

impl Binning {
    /// Binning with `bins` bins over `[low, high)`.
    #[must_use]
    pub const fn new(bins: usize, low: f64, high: f64) -> Self {
        Self { bins, low, high }
    }

    fn validate(&self, what: &str) -> Result<(), ValidationError> {
        if self.bins == 0 || !self.low.is_finite() || !self.high.is_finite() || self.low >= self.high {
            return Err(ValidationError::InvalidConfig {
                reason: format!("{what} binning needs bins > 0 and finite low < high"),
            });
        }
        Ok(())
    }
}

/// Axes of the run-level histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Momentum edges of the `muons` histogram [GeV].
    pub momentum_edges: Vec<f64>,
    /// Hadronic energy exponents of the `muons` histogram.
    pub hcal_log10: Binning,
    /// Electromagnetic energy exponents of the `muons` histogram.
    pub ecal_log10: Binning,
    /// Momentum axis of the `p_loss` histogram [GeV].
    pub loss_momentum: Binning,
    /// Momentum-loss axis of the `p_loss` histogram [GeV].
    pub loss: Binning,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            momentum_edges: vec![0.0, 800.0, 1600.0, 2400.0, 3200.0, 4000.0],
            hcal_log10: Binning::new(50, -2.5, 0.5),
            ecal_log10: Binning::new(50, -1.0, 2.0),
            loss_momentum: Binning::new(50, 0.0, 4000.0),
            loss: Binning::new(100, 0.0, 400.0),
        }
    }
}

impl BinningConfig {
    /// Checks every axis.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for empty or inverted ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.hcal_log10.validate("hcal")?;
        self.ecal_log10.validate("ecal")?;
        self.loss_momentum.validate("loss momentum")?;
        self.loss.validate("loss")?;
        self.muons_histogram().map(|_| ()).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// Empty `muons` histogram: (p, hcal, ecal).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` for malformed axes.
    pub fn muons_histogram(&self) -> Result<Histogram, ValidationError> {
        Histogram::new(
            "muons",
            vec![
                Axis::edges("p", "Generated momentum [GeV]", self.momentum_edges.clone())?,
                Axis::log(
                    "hcal",
                    "HCAL energy [GeV]",
                    self.hcal_log10.bins,
                    self.hcal_log10.low,
                    self.hcal_log10.high,
                )?,
                Axis::log(
                    "ecal",
                    "ECAL energy [GeV]",
                    self.ecal_log10.bins,
                    self.ecal_log10.low,
                    self.ecal_log10.high,
                )?,
            ],
        )
    }

    /// Empty `p_loss` histogram: (p, dp).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` for malformed axes.
    pub fn p_loss_histogram(&self) -> Result<Histogram, ValidationError> {
        Histogram::new(
            "p_loss",
            vec![
                Axis::regular(
                    "p",
                    "Generated momentum [GeV]",
                    self.loss_momentum.bins,
                    self.loss_momentum.low,
                    self.loss_momentum.high,
                )?,
                Axis::regular("dp", "Momentum loss [GeV]", self.loss.bins, self.loss.low, self.loss.high)?,
            ],
        )
    }
}

/// All metrics of one run, or of one partition of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAccumulator {
    /// Events seen, per dataset.
    pub all_events: Counter,
    /// Muons surviving each successive selection step.
    pub cutflow: Counter,
    /// Every generated muon in (p, hcal energy, ecal energy).
    pub muons: Histogram,
    /// Selected muons in (p, dp).
    pub p_loss: Histogram,
    /// Selected muons as flat columns.
    pub samples: SampleColumns,
}

impl RunAccumulator {
    /// Empty accumulator with the configured axes.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidAxis` for malformed binning.
    pub fn new(binning: &BinningConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            all_events: Counter::default(),
            cutflow: Counter::default(),
            muons: binning.muons_histogram()?,
            p_loss: binning.p_loss_histogram()?,
            samples: SampleColumns::default(),
        })
    }
}

impl Accumulator for RunAccumulator {
    fn identity(&self) -> Self {
        Self {
            all_events: self.all_events.identity(),
            cutflow: self.cutflow.identity(),
            muons: self.muons.identity(),
            p_loss: self.p_loss.identity(),
            samples: self.samples.identity(),
        }
    }

    fn merge(&mut self, other: &Self) -> Result<(), ExecutionError> {
        Accumulator::merge(&mut self.muons, &other.muons)?;
        Accumulator::merge(&mut self.p_loss, &other.p_loss)?;
        self.all_events.merge(&other.all_events)?;
        self.cutflow.merge(&other.cutflow)?;
        self.samples.merge(&other.samples)?;
        Ok(())
    }
}
