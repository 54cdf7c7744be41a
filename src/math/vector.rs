// 3D vector with value semantics
//
// Every operation returns a new vector, nothing mutates in place.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use super::quaternion::Quaternion;

/// A 3D vector of `f64` components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Multiply every component by `f`
    pub fn scale(self, f: f64) -> Self {
        Self::new(self.x * f, self.y * f, self.z * f)
    }

    /// Component-wise product
    pub fn mul_elements(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction.
    ///
    /// The zero vector has no direction; callers must check `length()` first
    /// or use [`Vector3::try_unit`].
    pub fn unit(self) -> Self {
        self.scale(1.0 / self.length())
    }

    /// Unit vector, or `None` for a zero-length vector
    pub fn try_unit(self) -> Option<Self> {
        let len = self.length();
        if len == 0.0 || !len.is_finite() {
            None
        } else {
            Some(self.scale(1.0 / len))
        }
    }

    /// Angle between two non-zero vectors, in degrees
    pub fn angle_to(self, other: Self) -> f64 {
        let cos = self.dot(other) / (self.length() * other.length());
        // Rounding can push nearly parallel vectors just outside acos' domain
        cos.clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// Remove the component of this vector along `normal`
    pub fn project_to_plane(self, normal: Self) -> Self {
        let n = normal.unit();
        self - n.scale(self.dot(n))
    }

    /// This vector rotated by `q`
    pub fn rotated(self, q: Quaternion) -> Self {
        q.apply(self)
    }

    /// True when every component is within `eps` of `other`
    pub fn approx_eq(self, other: Self, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl Div<f64> for Vector3 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x{:.2},y{:.2},z{:.2})", self.x, self.y, self.z)
    }
}
