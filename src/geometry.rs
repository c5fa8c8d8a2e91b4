//! Chamber identifier decoding and angular conversions.
//!
//! Chamber identifiers are packed integers:
//!
//! ```text
//!  bit  10      8 7  6 5        0
//!      [endcap][stn ][ring][chamber]
//! ```
//!
//! Every field is stored zero-based. No range validation is performed: any
//! two-bit station or ring value decodes to 1..=4, and bits above the endcap
//! field leak into the endcap number.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest |eta| accepted by [`checked_momentum_from_pt_eta`].
pub const MAX_ABS_ETA: f64 = 10.0;

/// Packed chamber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChamberId(u32);

impl ChamberId {
    /// Wraps a packed identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Converts a column value into a packed identifier.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidChamberId` for negative values or values wider than 32 bits.
    pub fn from_i64(value: i64) -> Result<Self, ValidationError> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| ValidationError::InvalidChamberId { value })
    }

    /// Raw packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Endcap number (1 or 2 for well-formed ids).
    #[must_use]
    pub const fn endcap(self) -> u32 {
        (self.0 >> 10) + 1
    }

    /// Station number, 1..=4.
    #[must_use]
    pub const fn station(self) -> u32 {
        ((self.0 >> 8) & 0b11) + 1
    }

    /// Ring number, 1..=4.
    #[must_use]
    pub const fn ring(self) -> u32 {
        ((self.0 >> 6) & 0b11) + 1
    }

    /// Chamber number, 1..=64.
    #[must_use]
    pub const fn chamber(self) -> u32 {
        (self.0 & 0b11_1111) + 1
    }
}

impl fmt::Display for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.endcap() == 1 { '+' } else { '-' };
        write!(
            f,
            "ME{sign}{}/{}/{}",
            self.station(),
            self.ring(),
            self.chamber()
        )
    }
}

/// Polar angle for a pseudorapidity.
#[must_use]
pub fn theta_from_eta(eta: f64) -> f64 {
    2.0 * (-eta).exp().atan()
}

/// Pseudorapidity for a polar angle in (0, π).
#[must_use]
pub fn eta_from_theta(theta: f64) -> f64 {
    -(theta / 2.0).tan().ln()
}

/// Total momentum from transverse momentum and pseudorapidity.
///
/// Non-finite for |eta| large enough that sin(theta) underflows.
#[must_use]
pub fn momentum_from_pt_eta(pt: f64, eta: f64) -> f64 {
    pt / theta_from_eta(eta).sin()
}

/// Like [`momentum_from_pt_eta`] but rejects degenerate geometry.
///
/// # Errors
///
/// Returns `ValidationError::DegenerateGeometry` if |eta| exceeds [`MAX_ABS_ETA`]
/// or the result is not finite.
pub fn checked_momentum_from_pt_eta(pt: f64, eta: f64) -> Result<f64, ValidationError> {
    if !eta.is_finite() || eta.abs() > MAX_ABS_ETA {
        return Err(ValidationError::DegenerateGeometry { pt, eta });
    }
    let p = momentum_from_pt_eta(pt, eta);
    if p.is_finite() {
        Ok(p)
    } else {
        Err(ValidationError::DegenerateGeometry { pt, eta })
    }
}

/// Azimuthal difference with the one-sided wrap: `|a - b|`, minus 2π above π.
///
/// Only the positive overflow is corrected. Because the absolute value is taken
/// first the result always lies in (-π, π].
#[must_use]
pub fn delta_phi(a: f64, b: f64) -> f64 {
    let d_phi = (a - b).abs();
    if d_phi > PI {
        d_phi - 2.0 * PI
    } else {
        d_phi
    }
}
