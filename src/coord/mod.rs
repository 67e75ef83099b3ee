// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Coordinates used by the interferometric measurement equation.
//!
//! This coordinate system is discussed at length in Interferometry and
//! Synthesis in Radio Astronomy, Third Edition, Section 4: Geometrical
//! Relationships, Polarimetry, and the Measurement Equation.

use serde::{Deserialize, Serialize};

use crate::constants::{TAU, VEL_C};

/// The (u,v,w) coordinates of a baseline, in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UVW {
    /// u-coordinate \[meters\]
    pub u: f64,
    /// v-coordinate \[meters\]
    pub v: f64,
    /// w-coordinate \[meters\]
    pub w: f64,
}

impl UVW {
    /// Divide by the wavelength at `freq_hz`, making the coordinates
    /// dimensionless.
    pub fn in_wavelengths(self, freq_hz: f64) -> UVW {
        self * freq_hz / VEL_C
    }
}

impl std::ops::Mul<f64> for UVW {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        UVW {
            u: self.u * rhs,
            v: self.v * rhs,
            w: self.w * rhs,
        }
    }
}

impl std::ops::Div<f64> for UVW {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        UVW {
            u: self.u / rhs,
            v: self.v / rhs,
            w: self.w / rhs,
        }
    }
}

/// (l,m,n) direction-cosine coordinates. All units are in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub struct LMN {
    /// l-coordinate \[radians\]
    pub l: f64,
    /// m-coordinate \[radians\]
    pub m: f64,
    /// n-coordinate \[radians\]
    pub n: f64,
}

impl LMN {
    /// Complete (l, m) with n. Directions beyond the horizon get n = 0.
    pub fn from_lm(l: f64, m: f64) -> LMN {
        let n2 = 1.0 - l * l - m * m;
        LMN {
            l,
            m,
            n: if n2 > 0.0 { n2.sqrt() } else { 0.0 },
        }
    }

    /// Prepare the coordinates for use in a measurement-equation phase,
    /// `exp(i (u l' + v m' + w n'))`.
    pub fn prepare_for_rime(self) -> LmnRime {
        LmnRime {
            l: -TAU * self.l,
            m: -TAU * self.m,
            n: -TAU * (self.n - 1.0),
        }
    }
}

/// Direction cosines premultiplied by -2π, with n shifted by -1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LmnRime {
    pub l: f64,
    pub m: f64,
    pub n: f64,
}
