// Canonical robot axes and change-of-basis between mounting frames
//
// Canonical convention: x forward, y down, z left.

use serde::{Deserialize, Serialize};

use super::vector::Vector3;

pub const FORWARD: Vector3 = Vector3::new(1.0, 0.0, 0.0);
pub const BACKWARD: Vector3 = Vector3::new(-1.0, 0.0, 0.0);
pub const DOWN: Vector3 = Vector3::new(0.0, 1.0, 0.0);
pub const UP: Vector3 = Vector3::new(0.0, -1.0, 0.0);
pub const LEFT: Vector3 = Vector3::new(0.0, 0.0, 1.0);
pub const RIGHT: Vector3 = Vector3::new(0.0, 0.0, -1.0);
pub const ZERO: Vector3 = Vector3::zero();

/// Remaps vectors between a source frame and a target frame.
///
/// Each side is described by where its forward, up and left directions lie.
/// Both triples must be orthonormal for the mapping to be a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxesRemapper {
    #[serde(rename = "src-forward")]
    pub src_forward: Vector3,
    #[serde(rename = "src-up")]
    pub src_up: Vector3,
    #[serde(rename = "src-left")]
    pub src_left: Vector3,

    #[serde(rename = "target-forward")]
    pub target_forward: Vector3,
    #[serde(rename = "target-up")]
    pub target_up: Vector3,
    #[serde(rename = "target-left")]
    pub target_left: Vector3,
}

impl Default for AxesRemapper {
    fn default() -> Self {
        Self::new(FORWARD, UP, LEFT)
    }
}

impl AxesRemapper {
    /// Remapper from the given source axes onto the canonical axes
    pub fn new(src_forward: Vector3, src_up: Vector3, src_left: Vector3) -> Self {
        Self::with_target(src_forward, src_up, src_left, FORWARD, UP, LEFT)
    }

    pub fn with_target(
        src_forward: Vector3,
        src_up: Vector3,
        src_left: Vector3,
        target_forward: Vector3,
        target_up: Vector3,
        target_left: Vector3,
    ) -> Self {
        Self {
            src_forward,
            src_up,
            src_left,
            target_forward,
            target_up,
            target_left,
        }
    }

    /// Source frame vector to target frame, keeping its meaning
    pub fn remap(&self, v: Vector3) -> Vector3 {
        let fwd = v.dot(self.src_forward);
        let up = v.dot(self.src_up);
        let left = v.dot(self.src_left);
        self.target_forward * fwd + self.target_up * up + self.target_left * left
    }

    /// Target frame vector back to the source frame
    pub fn remap_inverse(&self, v: Vector3) -> Vector3 {
        let fwd = v.dot(self.target_forward);
        let up = v.dot(self.target_up);
        let left = v.dot(self.target_left);
        self.src_forward * fwd + self.src_up * up + self.src_left * left
    }

    /// Whether both triples are unit length and mutually orthogonal
    pub fn is_orthonormal(&self) -> bool {
        is_orthonormal_triple(self.src_forward, self.src_up, self.src_left)
            && is_orthonormal_triple(self.target_forward, self.target_up, self.target_left)
    }
}

fn is_orthonormal_triple(a: Vector3, b: Vector3, c: Vector3) -> bool {
    const EPS: f64 = 1e-6;
    let unit = |v: Vector3| (v.length() - 1.0).abs() < EPS;
    unit(a)
        && unit(b)
        && unit(c)
        && a.dot(b).abs() < EPS
        && b.dot(c).abs() < EPS
        && a.dot(c).abs() < EPS
}
