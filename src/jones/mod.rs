// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Code for general Jones matrix math.

Only 2x2 matrices are ever needed, so the multiplies and inverses are written
out by hand. Elements are stored row-major, i.e. `[XX, XY, YX, YY]`.
 */


use crate::c64;

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Jones([c64; 4]);

const JONES_ZERO: Jones = Jones([c64::new(0.0, 0.0); 4]);

const JONES_IDENTITY: Jones = Jones([
    c64::new(1.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(0.0, 0.0),
    c64::new(1.0, 0.0),
]);

impl Jones {
    pub fn identity() -> Self {
        JONES_IDENTITY
    }

    pub fn zero() -> Self {
        JONES_ZERO
    }

    pub fn nan() -> Self {
        Jones([c64::new(f64::NAN, f64::NAN); 4])
    }

    /// A diagonal Jones matrix with the given parallel-hand elements.
    pub fn diag(xx: c64, yy: c64) -> Self {
        Jones([xx, c64::new(0.0, 0.0), c64::new(0.0, 0.0), yy])
    }

    /// A Jones matrix that behaves as a complex scalar.
    pub fn scalar(s: c64) -> Self {
        Self::diag(s, s)
    }

    /// From an input Jones matrix, get a copy that has been Hermitian
    /// conjugated (J^H).
    #[inline(always)]
    pub fn h(&self) -> Self {
        Self::from([
            self[0].conj(),
            self[2].conj(),
            self[1].conj(),
            self[3].conj(),
        ])
    }

    /// Multiply by a Jones matrix which gets Hermitian conjugated (J^H).
    #[inline(always)]
    pub fn mul_hermitian(&self, b: &Self) -> Self {
        let mut a = *self;
        a *= b.h();
        a
    }

    /// Get the inverse of the Jones matrix (J^I).
    ///
    /// Ideally, J^I . J = I. However it's possible that J is singular, in which
    /// case the contents of J^I are all NaN.
    #[inline(always)]
    pub fn inv(&self) -> Self {
        let a = self;
        let det = a[0] * a[3] - a[1] * a[2];
        if det.norm_sqr() == 0.0 {
            return Self::nan();
        }
        let inv_det = 1.0 / det;
        Jones([
            inv_det * a[3],
            -inv_det * a[1],
            -inv_det * a[2],
            inv_det * a[0],
        ])
    }

    /// Are any of the elements NaN?
    pub fn any_nan(&self) -> bool {
        self.iter().any(|e| e.re.is_nan() || e.im.is_nan())
    }

    /// Zero the cross-hand elements.
    pub fn parallel_hands(&self) -> Self {
        Self::diag(self[0], self[3])
    }

    /// The sum of the squared norms of all elements (the squared Frobenius
    /// norm).
    pub fn norm_sqr(&self) -> f64 {
        self.iter().map(|e| e.norm_sqr()).sum()
    }
}

impl std::ops::Deref for Jones {
    type Target = [c64; 4];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Jones {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<[c64; 4]> for Jones {
    fn from(arr: [c64; 4]) -> Self {
        Self(arr)
    }
}

impl std::ops::Add<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Jones) -> Self {
        let a = self.0;
        let b = rhs.0;
        Jones([a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]])
    }
}

impl std::ops::AddAssign<Jones> for Jones {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Jones) {
        self[0] += rhs[0];
        self[1] += rhs[1];
        self[2] += rhs[2];
        self[3] += rhs[3];
    }
}

impl std::ops::Sub<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Jones) -> Self {
        let a = self.0;
        let b = rhs.0;
        Jones([a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]])
    }
}

impl std::ops::SubAssign<Jones> for Jones {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: Jones) {
        self[0] -= rhs[0];
        self[1] -= rhs[1];
        self[2] -= rhs[2];
        self[3] -= rhs[3];
    }
}

impl std::ops::Mul<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Jones) -> Self {
        let a = self.0;
        let b = rhs.0;
        Jones([
            a[0] * b[0] + a[1] * b[2],
            a[0] * b[1] + a[1] * b[3],
            a[2] * b[0] + a[3] * b[2],
            a[2] * b[1] + a[3] * b[3],
        ])
    }
}

impl std::ops::Mul<&Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: &Jones) -> Self {
        self * *rhs
    }
}

impl std::ops::MulAssign<Jones> for Jones {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Jones) {
        *self = *self * rhs;
    }
}

impl std::ops::Mul<f64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f64) -> Self {
        let a = self.0;
        Jones([a[0] * rhs, a[1] * rhs, a[2] * rhs, a[3] * rhs])
    }
}

impl std::ops::MulAssign<f64> for Jones {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: f64) {
        self[0] *= rhs;
        self[1] *= rhs;
        self[2] *= rhs;
        self[3] *= rhs;
    }
}

impl std::ops::Mul<c64> for Jones {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: c64) -> Self {
        let a = self.0;
        Jones([a[0] * rhs, a[1] * rhs, a[2] * rhs, a[3] * rhs])
    }
}

impl std::ops::MulAssign<c64> for Jones {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: c64) {
        self[0] *= rhs;
        self[1] *= rhs;
        self[2] *= rhs;
        self[3] *= rhs;
    }
}

/// `a / b` is `a . b^I`. When `b` is singular, the result is all NaN.
impl std::ops::Div<Jones> for Jones {
    type Output = Self;

    #[inline(always)]
    fn div(self, rhs: Jones) -> Self {
        let inv = rhs.inv();
        if inv.any_nan() {
            return Jones::nan();
        }
        self * inv
    }
}

impl num_traits::Zero for Jones {
    #[inline]
    fn zero() -> Self {
        Jones::zero()
    }

    #[inline]
    fn is_zero(&self) -> bool {
        *self == Jones::zero()
    }
}

impl approx::AbsDiffEq for Jones {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    #[inline]
    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self[0] - other[0]).norm() <= epsilon
            && (self[1] - other[1]).norm() <= epsilon
            && (self[2] - other[2]).norm() <= epsilon
            && (self[3] - other[3]).norm() <= epsilon
    }
}
