//! Raw columnar events and the field sets used to type them.
//!
//! An external provider hands over each event as a set of named columns
//! (one value per object). An [`EventSchema`] names the columns that make up
//! generated particles, calorimeter deposits and chamber hits, and turns a
//! [`RawEvent`] into a typed [`Event`]. The schema is an ordinary value passed
//! to whoever needs it; nothing is registered globally.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::{CaloDeposit, Event, GeneratedParticle, SimHit};
use crate::geometry::ChamberId;

/// One column of per-object values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// Integer column (identifiers, particle-type codes).
    Int(Vec<i64>),
    /// Floating point column.
    Float(Vec<f64>),
}

impl Column {
    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    /// True if the column holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[allow(clippy::cast_precision_loss)]
    fn floats(&self) -> Cow<'_, [f64]> {
        match self {
            Self::Float(v) => Cow::Borrowed(v.as_slice()),
            Self::Int(v) => Cow::Owned(v.iter().map(|&x| x as f64).collect()),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn ints(&self, field: &str) -> Result<Cow<'_, [i64]>, ValidationError> {
        match self {
            Self::Int(v) => Ok(Cow::Borrowed(v.as_slice())),
            // JSON writers sometimes emit integral ids as floats.
            Self::Float(v) => v
                .iter()
                .map(|&x| {
                    if x.fract() == 0.0 && x.is_finite() {
                        Ok(x as i64)
                    } else {
                        Err(ValidationError::ColumnType {
                            field: field.to_string(),
                            expected: "integer",
                        })
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Cow::Owned),
        }
    }
}

/// An event as named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent {
    columns: BTreeMap<String, Column>,
}

impl RawEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, replacing any column of the same name.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Adds a float column.
    #[must_use]
    pub fn with_floats(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.with_column(name, Column::Float(values))
    }

    /// Adds an integer column.
    #[must_use]
    pub fn with_ints(self, name: impl Into<String>, values: Vec<i64>) -> Self {
        self.with_column(name, Column::Int(values))
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    fn require(&self, name: &str) -> Result<&Column, ValidationError> {
        self.columns.get(name).ok_or_else(|| ValidationError::MissingField {
            field: name.to_string(),
        })
    }

    fn floats(&self, name: &str, expected: Option<usize>) -> Result<Cow<'_, [f64]>, ValidationError> {
        let values = self.require(name)?.floats();
        check_len(name, expected, values.len())?;
        Ok(values)
    }

    fn ints(&self, name: &str, expected: Option<usize>) -> Result<Cow<'_, [i64]>, ValidationError> {
        let values = self.require(name)?.ints(name)?;
        check_len(name, expected, values.len())?;
        Ok(values)
    }
}

fn check_len(field: &str, expected: Option<usize>, actual: usize) -> Result<(), ValidationError> {
    match expected {
        Some(expected) if expected != actual => Err(ValidationError::LengthMismatch {
            field: field.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// A named batch of raw events, the unit of parallel processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Dataset the events belong to.
    pub dataset: String,
    /// Events in the batch.
    pub events: Vec<RawEvent>,
}

impl EventBatch {
    /// Creates a batch.
    pub fn new(dataset: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            dataset: dataset.into(),
            events,
        }
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the batch has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Columns holding generated particles.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFields {
    pub pt: String,
    pub eta: String,
    pub phi: String,
}

impl Default for ParticleFields {
    fn default() -> Self {
        Self {
            pt: "gen_pt".to_string(),
            eta: "gen_eta".to_string(),
            phi: "gen_phi".to_string(),
        }
    }
}

/// Columns holding one calorimeter sub-detector, named `{prefix}_calo_hits_*`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalorimeterFields {
    pub prefix: String,
}

impl CalorimeterFields {
    /// Sub-detector with the given column prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn column(&self, leaf: &str) -> String {
        format!("{}_calo_hits_{leaf}", self.prefix)
    }

    fn read(&self, raw: &RawEvent, out: &mut Vec<CaloDeposit>) -> Result<(), ValidationError> {
        let had_name = self.column("energyHad");
        let had = raw.floats(&had_name, None)?;
        let n = Some(had.len());
        let em = raw.floats(&self.column("energyEM"), n)?;
        let eta = raw.floats(&self.column("eta"), n)?;
        let phi = raw.floats(&self.column("phi"), n)?;
        out.extend((0..had.len()).map(|i| CaloDeposit {
            hadronic: had[i],
            electromagnetic: em[i],
            eta: eta[i],
            phi: phi[i],
        }));
        Ok(())
    }
}

/// Columns holding simulated chamber hits.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitFields {
    pub chamber_id: String,
    pub particle_type: String,
    pub phi: String,
    pub theta: String,
    pub momentum: String,
    pub energy_loss: String,
}

impl Default for HitFields {
    fn default() -> Self {
        Self {
            chamber_id: "sim_id".to_string(),
            particle_type: "sim_type".to_string(),
            phi: "sim_phi".to_string(),
            theta: "sim_theta".to_string(),
            momentum: "sim_p".to_string(),
            energy_loss: "sim_eloss".to_string(),
        }
    }
}

/// Field sets for every object type read from an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSchema {
    /// Generated particle columns.
    pub particles: ParticleFields,
    /// Hadronic sub-detectors, concatenated in this order.
    pub hadronic: Vec<CalorimeterFields>,
    /// Electromagnetic sub-detectors, concatenated in this order.
    pub electromagnetic: Vec<CalorimeterFields>,
    /// Chamber hit columns.
    pub hits: HitFields,
}

impl Default for EventSchema {
    fn default() -> Self {
        Self {
            particles: ParticleFields::default(),
            hadronic: vec![CalorimeterFields::new("hcal")],
            electromagnetic: vec![
                CalorimeterFields::new("ecalPreshower"),
                CalorimeterFields::new("ecalBarrel"),
                CalorimeterFields::new("ecalEndcap"),
            ],
            hits: HitFields::default(),
        }
    }
}

impl EventSchema {
    /// Types one raw event.
    ///
    /// # Errors
    ///
    /// - `MissingField` if a named column is absent
    /// - `LengthMismatch` if columns of the same object type disagree in length
    /// - `ColumnType` / `InvalidChamberId` for malformed identifier columns
    /// - `DegenerateGeometry` if a particle has no finite momentum
    pub fn materialize(&self, raw: &RawEvent) -> Result<Event, ValidationError> {
        let pt = raw.floats(&self.particles.pt, None)?;
        let n = Some(pt.len());
        let eta = raw.floats(&self.particles.eta, n)?;
        let phi = raw.floats(&self.particles.phi, n)?;
        let particles = (0..pt.len())
            .map(|i| GeneratedParticle::from_pt_eta_phi(pt[i], eta[i], phi[i]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut hadronic = Vec::new();
        for calo in &self.hadronic {
            calo.read(raw, &mut hadronic)?;
        }
        let mut electromagnetic = Vec::new();
        for calo in &self.electromagnetic {
            calo.read(raw, &mut electromagnetic)?;
        }

        let fields = &self.hits;
        let ids = raw.ints(&fields.chamber_id, None)?;
        let n = Some(ids.len());
        let types = raw.ints(&fields.particle_type, n)?;
        let hit_phi = raw.floats(&fields.phi, n)?;
        let theta = raw.floats(&fields.theta, n)?;
        let momentum = raw.floats(&fields.momentum, n)?;
        let energy_loss = raw.floats(&fields.energy_loss, n)?;
        let hits = (0..ids.len())
            .map(|i| {
                Ok(SimHit::from_theta(
                    ChamberId::from_i64(ids[i])?,
                    types[i],
                    hit_phi[i],
                    theta[i],
                    momentum[i],
                    energy_loss[i],
                ))
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(Event {
            particles,
            hadronic,
            electromagnetic,
            hits,
        })
    }
}
