// Quaternion rotation algebra
//
// Angles are in degrees throughout. A quaternion used as an orientation must
// be unit length; non-unit values only appear as intermediates (pure
// quaternions inside `apply`, the result of `inverse` on non-unit input).

use std::fmt;
use std::ops::Mul;

use serde::{Deserialize, Serialize};

use super::axes::{FORWARD, UP};
use super::vector::Vector3;

/// Quaternion `w + x*i + y*j + z*k`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    /// The no-rotation quaternion
    pub const IDENTITY: Quaternion = Quaternion::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Pure quaternion `(0, v)`
    pub const fn pure(v: Vector3) -> Self {
        Self::new(0.0, v.x, v.y, v.z)
    }

    /// Rotation of `degrees` around `axis` (right-hand rule), normalized.
    ///
    /// A zero-length axis describes no rotation and yields the identity.
    pub fn from_angle_axis(axis: Vector3, degrees: f64) -> Self {
        let Some(axis) = axis.try_unit() else {
            return Self::IDENTITY;
        };
        let half = degrees.to_radians() / 2.0;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s).unit()
    }

    /// Rotation taking direction `from` onto direction `to`
    pub fn from_to(from: Vector3, to: Vector3) -> Self {
        Self::from_angle_axis(from.cross(to), from.angle_to(to))
    }

    /// Vector part `(x, y, z)`
    pub fn vector(self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm_squared(self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn unit(self) -> Self {
        let k = self.norm();
        Self::new(self.w / k, self.x / k, self.y / k, self.z / k)
    }

    /// Conjugate rescaled so that `q * q.inverse() == 1`
    pub fn inverse(self) -> Self {
        let k2 = self.norm_squared();
        let c = self.conjugate();
        Self::new(c.w / k2, c.x / k2, c.y / k2, c.z / k2)
    }

    /// Hamilton product `self * other`
    pub fn prod(self, other: Self) -> Self {
        let (a, b) = (self, other);
        Self::new(
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y + a.y * b.w + a.z * b.x - a.x * b.z,
            a.w * b.z + a.z * b.w + a.x * b.y - a.y * b.x,
        )
    }

    /// Left-to-right product of a chain of quaternions.
    ///
    /// An empty chain is the identity.
    pub fn product<I>(quats: I) -> Self
    where
        I: IntoIterator<Item = Quaternion>,
    {
        quats
            .into_iter()
            .fold(Self::IDENTITY, |acc, q| acc.prod(q))
    }

    /// Rotate `v` by this quaternion: vector part of `q * (0, v) * conj(q)`
    pub fn apply(self, v: Vector3) -> Vector3 {
        Self::product([self, Self::pure(v), self.conjugate()]).vector()
    }

    /// Compose `b` as a rotation in this orientation's own frame (`self * b`)
    pub fn rotate_by_local(self, b: Self) -> Self {
        self.prod(b)
    }

    /// Compose `b` as a rotation in the fixed global frame (`b * self`)
    pub fn rotate_by_global(self, b: Self) -> Self {
        b.prod(self)
    }

    /// Heading (yaw about the up axis) in degrees.
    ///
    /// Returns 0 when the rotated forward axis points straight up or down.
    pub fn heading_angle(self) -> f64 {
        let fwd = FORWARD.rotated(self).project_to_plane(UP);
        match fwd.try_unit() {
            Some(fwd) => fwd.z.atan2(fwd.x).to_degrees(),
            None => 0.0,
        }
    }

    /// This orientation with its global heading removed
    pub fn no_yaw(self) -> Self {
        let heading = self.heading_angle();
        let correction = Self::from_angle_axis(UP, heading).inverse();
        self.rotate_by_global(correction)
    }

    /// True when every component is within `eps` of `other`
    pub fn approx_eq(self, other: Self, eps: f64) -> bool {
        (self.w - other.w).abs() <= eps
            && (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
    }

    /// Same rotation as `other` (`q` and `-q` are equivalent)
    pub fn same_rotation(self, other: Self, eps: f64) -> bool {
        let neg = Self::new(-other.w, -other.x, -other.y, -other.z);
        self.approx_eq(other, eps) || self.approx_eq(neg, eps)
    }
}

impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.prod(rhs)
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(w{:.2},x{:.2},y{:.2},z{:.2})",
            self.w, self.x, self.y, self.z
        )
    }
}
