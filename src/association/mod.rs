//! Delta-R association of generated particles with detector objects.
//!
//! For one event, every particle is compared with every detector object
//! (O(N×M), both are tens per event). An object is matched when
//! `dR < cut`; matched objects are folded in stored order by an
//! [`Aggregation`] rule. The output has exactly one value per particle, in
//! particle order, and a rule-specific sentinel when nothing matched.

mod exit;

pub use exit::{ExitMomentumExtractor, HitSelection, MUON_PDG_ID, OUTERMOST_STATION};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::CaloDeposit;
use crate::geometry::delta_phi;

/// Default matching cone.
pub const DR_CUT: f64 = 0.2;

/// Output of the energy-sum rule for an unmatched particle.
pub const NO_ENERGY: f64 = 0.0;

/// Output of the exit-momentum rule for an unmatched particle.
pub const NO_EXIT_MOMENTUM: f64 = -1.0;

/// Anything with a direction in (eta, phi).
pub trait Direction {
    /// Pseudorapidity.
    fn eta(&self) -> f64;
    /// Azimuthal angle.
    fn phi(&self) -> f64;
}

/// Detector objects that carry an energy.
pub trait Deposit: Direction {
    /// Energy contributed when matched.
    fn energy(&self) -> f64;
}

impl Deposit for CaloDeposit {
    fn energy(&self) -> f64 {
        CaloDeposit::energy(self)
    }
}

/// `sqrt(dEta^2 + dPhi^2)` with the one-sided azimuthal wrap of [`delta_phi`].
pub fn delta_r<A: Direction + ?Sized, B: Direction + ?Sized>(a: &A, b: &B) -> f64 {
    let d_eta = a.eta() - b.eta();
    let d_phi = delta_phi(a.phi(), b.phi());
    (d_eta * d_eta + d_phi * d_phi).sqrt()
}

/// How matched objects are folded into one value per particle.
pub trait Aggregation<D> {
    /// Value before any match, returned unchanged when nothing matches.
    fn initial(&self) -> f64;

    /// Folds one matched object, visited in stored order.
    fn fold(&self, acc: f64, matched: &D) -> f64;
}

/// Sums the energy of all matched deposits.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergySum;

impl<D: Deposit> Aggregation<D> for EnergySum {
    fn initial(&self) -> f64 {
        NO_ENERGY
    }

    fn fold(&self, acc: f64, matched: &D) -> f64 {
        acc + matched.energy()
    }
}

/// Keeps an attribute of the last match in stored order.
///
/// "Last" means largest input index, not nearest in dR. Later hits sit in
/// deeper detector layers.
#[derive(Debug, Clone, Copy)]
pub struct LastMatch<F> {
    value: F,
    sentinel: f64,
}

impl<F> LastMatch<F> {
    /// Rule selecting `value(hit)` of the last match, or `sentinel`.
    pub const fn new(value: F, sentinel: f64) -> Self {
        Self { value, sentinel }
    }
}

impl<D, F: Fn(&D) -> f64> Aggregation<D> for LastMatch<F> {
    fn initial(&self) -> f64 {
        self.sentinel
    }

    fn fold(&self, _acc: f64, matched: &D) -> f64 {
        (self.value)(matched)
    }
}

/// Delta-R matcher with a fixed cone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRMatcher {
    cut: f64,
}

impl Default for DeltaRMatcher {
    fn default() -> Self {
        Self { cut: DR_CUT }
    }
}

impl DeltaRMatcher {
    /// Matcher with a custom cone size.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` unless `cut` is finite and positive.
    pub fn new(cut: f64) -> Result<Self, ValidationError> {
        if !(cut.is_finite() && cut > 0.0) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("dR cut must be finite and > 0 (got {cut})"),
            });
        }
        Ok(Self { cut })
    }

    /// Cone size.
    #[must_use]
    pub const fn cut(&self) -> f64 {
        self.cut
    }

    /// True if `object` lies strictly inside the cone around `particle`.
    pub fn matches<P: Direction + ?Sized, D: Direction + ?Sized>(&self, particle: &P, object: &D) -> bool {
        delta_r(particle, object) < self.cut
    }

    /// Associates one event's particles with its detector objects.
    pub fn associate<P, D, A>(&self, particles: &[P], objects: &[D], rule: &A) -> Vec<f64>
    where
        P: Direction,
        D: Direction,
        A: Aggregation<D>,
    {
        particles
            .iter()
            .map(|particle| {
                objects
                    .iter()
                    .filter(|object| self.matches(particle, *object))
                    .fold(rule.initial(), |acc, object| rule.fold(acc, object))
            })
            .collect()
    }

    /// Summed energy of the deposits around each particle; `0.0` when none.
    pub fn associated_energy<P: Direction, D: Deposit>(&self, particles: &[P], deposits: &[D]) -> Vec<f64> {
        self.associate(particles, deposits, &EnergySum)
    }

    /// Applies [`Self::associate`] event by event.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::LengthMismatch` if the two sides hold a different number of events.
    pub fn associate_events<P, D, A>(
        &self,
        particles: &[Vec<P>],
        objects: &[Vec<D>],
        rule: &A,
    ) -> Result<Vec<Vec<f64>>, ValidationError>
    where
        P: Direction,
        D: Direction,
        A: Aggregation<D>,
    {
        if particles.len() != objects.len() {
            return Err(ValidationError::LengthMismatch {
                field: "events".to_string(),
                expected: particles.len(),
                actual: objects.len(),
            });
        }
        Ok(particles
            .iter()
            .zip(objects)
            .map(|(p, o)| self.associate(p, o, rule))
            .collect())
    }
}
