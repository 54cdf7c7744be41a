// Rotation algebra shared by the IMU and leg modules
//
// Provides:
// - Vector3 and Quaternion value types (degrees for all angles)
// - Canonical forward/up/left axes and the axis remapper

pub mod axes;
pub mod quaternion;
pub mod vector;

pub use axes::{AxesRemapper, BACKWARD, DOWN, FORWARD, LEFT, RIGHT, UP, ZERO};
pub use quaternion::Quaternion;
pub use vector::Vector3;
