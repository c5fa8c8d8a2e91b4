//! Exit momentum: momentum-at-entry of the last matching hit.

use serde::{Deserialize, Serialize};

use super::{DeltaRMatcher, Direction, LastMatch, NO_EXIT_MOMENTUM};
use crate::event::SimHit;

/// PDG code of the muon (either charge).
pub const MUON_PDG_ID: i64 = 13;

/// Station whose entry momentum is taken as the exit momentum.
pub const OUTERMOST_STATION: u32 = 4;

/// Caller-side hit filter applied before exit-momentum extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitSelection {
    /// Absolute PDG particle-type code to keep.
    pub particle_type: i64,
    /// Station to keep.
    pub station: u32,
}

impl Default for HitSelection {
    fn default() -> Self {
        Self {
            particle_type: MUON_PDG_ID,
            station: OUTERMOST_STATION,
        }
    }
}

impl HitSelection {
    /// True if the hit passes the particle-type and station filter.
    #[must_use]
    pub fn matches(&self, hit: &SimHit) -> bool {
        hit.particle_type.abs() == self.particle_type && hit.station() == self.station
    }

    /// Selected hits, stored order preserved.
    #[must_use]
    pub fn select(&self, hits: &[SimHit]) -> Vec<SimHit> {
        hits.iter().filter(|h| self.matches(h)).copied().collect()
    }
}

/// Extracts the exit momentum of each particle from pre-filtered hits.
///
/// No filtering happens here; pass hits through [`HitSelection::select`] first.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitMomentumExtractor {
    matcher: DeltaRMatcher,
}

impl ExitMomentumExtractor {
    /// Extractor using the given matcher.
    #[must_use]
    pub const fn new(matcher: DeltaRMatcher) -> Self {
        Self { matcher }
    }

    /// One exit momentum per particle, `-1.0` when no hit matched.
    pub fn extract<P: Direction>(&self, particles: &[P], outer_hits: &[SimHit]) -> Vec<f64> {
        let rule = LastMatch::new(|hit: &SimHit| hit.momentum_at_entry, NO_EXIT_MOMENTUM);
        self.matcher.associate(particles, outer_hits, &rule)
    }
}
