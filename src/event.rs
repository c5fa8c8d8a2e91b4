//! Typed per-event sequences: generated particles, calorimeter deposits and
//! simulated chamber hits.
//!
//! These are produced by [`crate::schema::EventSchema::materialize`] and are
//! dropped once the event has been associated.

use serde::{Deserialize, Serialize};

use crate::association::Direction;
use crate::error::ValidationError;
use crate::geometry::{checked_momentum_from_pt_eta, eta_from_theta, ChamberId};

/// A generated (truth-level) particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratedParticle {
    /// Transverse momentum [GeV].
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuthal angle [rad].
    pub phi: f64,
    /// Total momentum derived from `pt` and `eta` [GeV].
    pub p: f64,
}

impl GeneratedParticle {
    /// Derives the total momentum and builds the particle.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DegenerateGeometry` when `eta` gives no finite momentum.
    pub fn from_pt_eta_phi(pt: f64, eta: f64, phi: f64) -> Result<Self, ValidationError> {
        let p = checked_momentum_from_pt_eta(pt, eta)?;
        Ok(Self { pt, eta, phi, p })
    }
}

impl Direction for GeneratedParticle {
    fn eta(&self) -> f64 {
        self.eta
    }

    fn phi(&self) -> f64 {
        self.phi
    }
}

/// A calorimeter energy deposit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaloDeposit {
    /// Hadronic energy [GeV].
    pub hadronic: f64,
    /// Electromagnetic energy [GeV].
    pub electromagnetic: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuthal angle [rad].
    pub phi: f64,
}

impl CaloDeposit {
    /// Total deposited energy.
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.hadronic + self.electromagnetic
    }
}

impl Direction for CaloDeposit {
    fn eta(&self) -> f64 {
        self.eta
    }

    fn phi(&self) -> f64 {
        self.phi
    }
}

/// A simulated hit in a tracking chamber.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimHit {
    /// Packed chamber identifier.
    pub chamber: ChamberId,
    /// PDG particle-type code of the particle that left the hit.
    pub particle_type: i64,
    /// Azimuthal angle [rad].
    pub phi: f64,
    /// Pseudorapidity, derived from the stored polar angle.
    pub eta: f64,
    /// Momentum at chamber entry [GeV].
    pub momentum_at_entry: f64,
    /// Energy lost in the chamber [GeV].
    pub energy_loss: f64,
}

impl SimHit {
    /// Builds a hit from its stored polar angle.
    #[must_use]
    pub fn from_theta(
        chamber: ChamberId,
        particle_type: i64,
        phi: f64,
        theta: f64,
        momentum_at_entry: f64,
        energy_loss: f64,
    ) -> Self {
        Self {
            chamber,
            particle_type,
            phi,
            eta: eta_from_theta(theta),
            momentum_at_entry,
            energy_loss,
        }
    }

    /// Station number of the hit's chamber.
    #[must_use]
    pub const fn station(&self) -> u32 {
        self.chamber.station()
    }
}

impl Direction for SimHit {
    fn eta(&self) -> f64 {
        self.eta
    }

    fn phi(&self) -> f64 {
        self.phi
    }
}

/// One materialized event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Generated particles in stored order.
    pub particles: Vec<GeneratedParticle>,
    /// Hadronic calorimeter deposits, sub-detectors concatenated in schema order.
    pub hadronic: Vec<CaloDeposit>,
    /// Electromagnetic calorimeter deposits, sub-detectors concatenated in schema order.
    pub electromagnetic: Vec<CaloDeposit>,
    /// Simulated chamber hits in stored order.
    pub hits: Vec<SimHit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn particle_derives_momentum() {
        let mu = GeneratedParticle::from_pt_eta_phi(100.0, 0.0, 1.0).unwrap();
        assert_relative_eq!(mu.p, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn particle_rejects_degenerate_eta() {
        assert!(GeneratedParticle::from_pt_eta_phi(100.0, 1e3, 0.0).is_err());
    }

    #[test]
    fn deposit_energy_is_sum() {
        let d = CaloDeposit {
            hadronic: 1.5,
            electromagnetic: 0.25,
            eta: 0.0,
            phi: 0.0,
        };
        assert_relative_eq!(d.energy(), 1.75);
    }

    #[test]
    fn hit_derives_eta_from_theta() {
        let hit = SimHit::from_theta(ChamberId::new(953), 13, 0.0, std::f64::consts::FRAC_PI_2, 50.0, 0.001);
        assert_relative_eq!(hit.eta, 0.0, epsilon = 1e-12);
        assert_eq!(hit.station(), 4);
    }
}
