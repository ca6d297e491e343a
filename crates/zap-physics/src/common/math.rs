//! 2D math on top of `glam`: rotations, rigid transforms, motion sweeps and
//! the small dense solves used by the constraint solver.

use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

// ---------------------------------------------------------------------------
// Cross products
// ---------------------------------------------------------------------------

/// Cross product of a vector and a scalar: `(s * v.y, -s * v.x)`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `(-s * v.y, s * v.x)`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Scalar 2D cross product `a.x * b.y - a.y * b.x`.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// Normalize `v`, returning the unit vector and the original length.
/// Near-zero vectors yield `(Vec2::ZERO, 0.0)`.
#[inline]
pub fn normalize_with_length(v: Vec2) -> (Vec2, f32) {
    let length = v.length();
    if length < f32::EPSILON {
        return (Vec2::ZERO, 0.0);
    }
    (v / length, length)
}

/// Returns true when both components are finite.
#[inline]
pub fn is_valid_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

// ---------------------------------------------------------------------------
// Rot
// ---------------------------------------------------------------------------

/// Rotation stored as sine/cosine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Rotation from an angle in radians.
    pub fn new(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Angle in radians, in `(-pi, pi]`.
    pub fn angle(self) -> f32 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector.
    #[inline]
    pub fn apply(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector.
    #[inline]
    pub fn apply_t(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * r`
    pub fn mul(self, r: Rot) -> Rot {
        Rot {
            s: self.s * r.c + self.c * r.s,
            c: self.c * r.c - self.s * r.s,
        }
    }

    /// `transpose(self) * r`
    pub fn mul_t(self, r: Rot) -> Rot {
        Rot {
            s: self.c * r.s - self.s * r.c,
            c: self.c * r.c + self.s * r.s,
        }
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(p: Vec2, angle: f32) -> Self {
        Self { p, q: Rot::new(angle) }
    }

    /// Map a local point to world space.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Map a world point to local space.
    #[inline]
    pub fn apply_t(&self, v: Vec2) -> Vec2 {
        self.q.apply_t(v - self.p)
    }

    /// `self * b`
    pub fn mul(&self, b: &Transform) -> Transform {
        Transform {
            q: self.q.mul(b.q),
            p: self.q.apply(b.p) + self.p,
        }
    }

    /// `inverse(self) * b`
    pub fn mul_t(&self, b: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(b.q),
            p: self.q.apply_t(b.p - self.p),
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Motion of a body's center of mass over a time step, used for
/// continuous collision. Poses are interpolated between `(c0, a0)` at
/// `alpha0` and `(c, a)` at the end of the step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    /// Fraction of the current step already consumed, in `[0, 1)`.
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let p = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::new(angle);
        Transform {
            p: p - q.apply(self.local_center),
            q,
        }
    }

    /// Advance the start of the sweep forward to `alpha`.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Shift both angles so `a0` lies in `[0, 2pi)`.
    pub fn normalize(&mut self) {
        let d = TAU * (self.a0 / TAU).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

// ---------------------------------------------------------------------------
// Dense solves
// ---------------------------------------------------------------------------

/// Column-major 2x2 helpers matching the constraint solver's needs.
pub trait Mat22Ext {
    /// Inverse, or zero when singular.
    fn inverse_or_zero(&self) -> Mat2;
    /// Solve `A * x = b`; zero determinant yields zero.
    fn solve(&self, b: Vec2) -> Vec2;
}

impl Mat22Ext for Mat2 {
    fn inverse_or_zero(&self) -> Mat2 {
        let (a, b) = (self.x_axis.x, self.y_axis.x);
        let (c, d) = (self.x_axis.y, self.y_axis.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat2::from_cols(Vec2::new(det * d, -det * c), Vec2::new(-det * b, det * a))
    }

    fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12) = (self.x_axis.x, self.y_axis.x);
        let (a21, a22) = (self.x_axis.y, self.y_axis.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

/// 3x3 helpers for the block joint solvers.
pub trait Mat33Ext {
    /// Solve `A * x = b` for the full system.
    fn solve33(&self, b: Vec3) -> Vec3;
    /// Solve the upper-left 2x2 block only.
    fn solve22(&self, b: Vec2) -> Vec2;
    /// Inverse of the upper-left 2x2 block, zero elsewhere.
    fn inverse22(&self) -> Mat3;
    /// Inverse of a symmetric matrix; zero when singular.
    fn sym_inverse33(&self) -> Mat3;
    /// Multiply the upper-left 2x2 block by `v`.
    fn mul22(&self, v: Vec2) -> Vec2;
}

impl Mat33Ext for Mat3 {
    fn solve33(&self, b: Vec3) -> Vec3 {
        let (ex, ey, ez) = (self.x_axis, self.y_axis, self.z_axis);
        let mut det = ex.dot(ey.cross(ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec3::new(
            det * b.dot(ey.cross(ez)),
            det * ex.dot(b.cross(ez)),
            det * ex.dot(ey.cross(b)),
        )
    }

    fn solve22(&self, b: Vec2) -> Vec2 {
        let (a11, a12) = (self.x_axis.x, self.y_axis.x);
        let (a21, a22) = (self.x_axis.y, self.y_axis.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    fn inverse22(&self) -> Mat3 {
        let (a, b) = (self.x_axis.x, self.y_axis.x);
        let (c, d) = (self.x_axis.y, self.y_axis.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat3::from_cols(
            Vec3::new(det * d, -det * c, 0.0),
            Vec3::new(-det * b, det * a, 0.0),
            Vec3::ZERO,
        )
    }

    fn sym_inverse33(&self) -> Mat3 {
        let (ex, ey, ez) = (self.x_axis, self.y_axis, self.z_axis);
        let mut det = ex.dot(ey.cross(ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        let (a11, a12, a13) = (ex.x, ey.x, ez.x);
        let (a22, a23) = (ey.y, ez.y);
        let a33 = ez.z;

        let m11 = det * (a22 * a33 - a23 * a23);
        let m12 = det * (a13 * a23 - a12 * a33);
        let m13 = det * (a12 * a23 - a13 * a22);
        let m22 = det * (a11 * a33 - a13 * a13);
        let m23 = det * (a13 * a12 - a11 * a23);
        let m33 = det * (a11 * a22 - a12 * a12);

        Mat3::from_cols(
            Vec3::new(m11, m12, m13),
            Vec3::new(m12, m22, m23),
            Vec3::new(m13, m23, m33),
        )
    }

    fn mul22(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.x_axis.x * v.x + self.y_axis.x * v.y,
            self.x_axis.y * v.x + self.y_axis.y * v.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn rot_roundtrip() {
        let q = Rot::new(0.7);
        let v = Vec2::new(1.5, -2.0);
        let back = q.apply_t(q.apply(v));
        assert_abs_diff_eq!(back.x, v.x, epsilon = 1e-5);
        assert_abs_diff_eq!(back.y, v.y, epsilon = 1e-5);
        assert_abs_diff_eq!(q.angle(), 0.7, epsilon = 1e-6);
    }

    #[test]
    fn transform_mul_t_is_relative() {
        let a = Transform::new(Vec2::new(1.0, 2.0), FRAC_PI_2);
        let b = Transform::new(Vec2::new(-3.0, 0.5), 0.3);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.25, 0.75);
        let direct = a.apply_t(b.apply(p));
        let via_rel = rel.apply(p);
        assert_abs_diff_eq!(direct.x, via_rel.x, epsilon = 1e-5);
        assert_abs_diff_eq!(direct.y, via_rel.y, epsilon = 1e-5);
    }

    #[test]
    fn sweep_advance_and_interpolate() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let mid = sweep.transform_at(0.5);
        assert_abs_diff_eq!(mid.p.x, 5.0, epsilon = 1e-5);
        sweep.advance(0.5);
        assert_abs_diff_eq!(sweep.c0.x, 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(sweep.a0, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(sweep.alpha0, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn sweep_normalize_keeps_delta() {
        let mut sweep = Sweep {
            a0: 7.0,
            a: 7.5,
            ..Default::default()
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < TAU);
        assert_abs_diff_eq!(sweep.a - sweep.a0, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn singular_solves_return_zero() {
        let m = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::ZERO);
        assert_eq!(m.inverse_or_zero(), Mat2::ZERO);
    }

    #[test]
    fn mat33_solves_match_inverse() {
        let k = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.25),
            Vec3::new(0.5, 0.25, 2.0),
        );
        let b = Vec3::new(1.0, -2.0, 0.5);
        let x = k.solve33(b);
        let check = k * x;
        assert_abs_diff_eq!(check.x, b.x, epsilon = 1e-4);
        assert_abs_diff_eq!(check.y, b.y, epsilon = 1e-4);
        assert_abs_diff_eq!(check.z, b.z, epsilon = 1e-4);

        let inv = k.sym_inverse33();
        let x2 = inv * b;
        assert_abs_diff_eq!(x.x, x2.x, epsilon = 1e-4);
        assert_abs_diff_eq!(x.y, x2.y, epsilon = 1e-4);
        assert_abs_diff_eq!(x.z, x2.z, epsilon = 1e-4);
    }

    #[test]
    fn normalize_degenerate_is_zero() {
        let (n, len) = normalize_with_length(Vec2::new(1e-9, 0.0));
        assert_eq!(n, Vec2::ZERO);
        assert_eq!(len, 0.0);
        let (n, len) = normalize_with_length(Vec2::new(3.0, 4.0));
        assert_abs_diff_eq!(len, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(n.length(), 1.0, epsilon = 1e-6);
    }
}
