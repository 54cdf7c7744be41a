// Leg inverse kinematics
// Converts a foot target (relative to the hip, canonical axes) into joint angles.

use serde::{Deserialize, Serialize};

use crate::math::Vector3;

/// Joint limit in both directions (degrees)
pub const JOINT_LIMIT: f64 = 90.0;

/// Fraction of full reach that out-of-range targets are pulled back to
const REACH_CLAMP: f64 = 1.999;

/// Motor names of a direct-drive leg, in output order
pub const DIRECT_MOTOR_NAMES: [&str; 3] = ["hip_z", "hip_x", "knee"];

/// Three-joint leg (lateral hip, swing hip, knee) with one motor per joint
/// and equal upper and lower bone lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectMotorIk {
    pub reverse_knee_joint: bool,
    pub reverse_hip_x_joint: bool,
    pub reverse_hip_z_joint: bool,
    /// Mirror the target along the forward axis before solving
    pub flip_x_axis: bool,
    pub knee_offset: f64,
    pub hip_x_offset: f64,
    pub hip_z_offset: f64,
    /// Length from hip to knee, and from knee to foot
    pub bone_length: f64,
}

impl Default for DirectMotorIk {
    fn default() -> Self {
        Self {
            reverse_knee_joint: false,
            reverse_hip_x_joint: false,
            reverse_hip_z_joint: false,
            flip_x_axis: false,
            knee_offset: 0.0,
            hip_x_offset: 0.0,
            hip_z_offset: 0.0,
            bone_length: 6.0,
        }
    }
}

impl DirectMotorIk {
    pub fn with_bone_length(bone_length: f64) -> Self {
        Self {
            bone_length,
            ..Self::default()
        }
    }

    /// Joint angles `[hip_z, hip_x, knee]` in degrees, each within ±90.
    ///
    /// Targets beyond full reach are pulled back along their direction.
    pub fn calculate_motor_rotations(&self, target: Vector3) -> [f64; 3] {
        let mut pos = target;
        if self.flip_x_axis {
            pos.x = -pos.x;
        }

        let reach = 2.0 * self.bone_length;
        let mut dist = pos.length();
        if dist >= reach {
            pos = pos * (REACH_CLAMP * self.bone_length / dist);
            dist = pos.length();
        }

        // Interior knee angle: 90 at rest, 180 fully straight
        let knee_interior = self.knee_degrees(dist);
        let mut knee = knee_interior - 90.0;
        let mut hip_x = knee_interior / 2.0 + degrees_between(pos.x, pos.y) - 135.0;
        let mut hip_z = degrees_between(pos.z, pos.y) - 90.0;

        if self.reverse_knee_joint {
            knee = -knee;
        }
        if self.reverse_hip_x_joint {
            hip_x = -hip_x;
        }
        if self.reverse_hip_z_joint {
            hip_z = -hip_z;
        }

        knee += self.knee_offset;
        hip_x += self.hip_x_offset;
        hip_z += self.hip_z_offset;

        [
            hip_z.clamp(-JOINT_LIMIT, JOINT_LIMIT),
            hip_x.clamp(-JOINT_LIMIT, JOINT_LIMIT),
            knee.clamp(-JOINT_LIMIT, JOINT_LIMIT),
        ]
    }

    /// Foot position where every joint reads zero
    pub fn resting_position(&self) -> Vector3 {
        Vector3::new(0.0, (2.0 * self.bone_length * self.bone_length).sqrt(), 0.0)
    }

    /// A leg with no length cannot reach anything; every angle would be NaN
    pub fn has_valid_bone_length(&self) -> bool {
        self.bone_length.is_finite() && self.bone_length > 0.0
    }

    fn knee_degrees(&self, dist: f64) -> f64 {
        let ratio = (dist / (2.0 * self.bone_length)).clamp(0.0, 1.0);
        (2.0 * ratio.asin()).to_degrees()
    }
}

/// Angle of the point `(x, y)` from the x axis, in degrees
fn degrees_between(x: f64, y: f64) -> f64 {
    y.atan2(x).to_degrees()
}

/// Leg solver kinds, tagged by `kind` in the config document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LegIk {
    DirectMotor(DirectMotorIk),
}

impl Default for LegIk {
    fn default() -> Self {
        LegIk::DirectMotor(DirectMotorIk::default())
    }
}

impl LegIk {
    /// Joint angles, aligned with [`LegIk::motor_names`]
    pub fn calculate_motor_rotations(&self, target: Vector3) -> Vec<f64> {
        match self {
            LegIk::DirectMotor(ik) => ik.calculate_motor_rotations(target).to_vec(),
        }
    }

    pub fn motor_names(&self) -> &'static [&'static str] {
        match self {
            LegIk::DirectMotor(_) => &DIRECT_MOTOR_NAMES,
        }
    }

    pub fn resting_position(&self) -> Vector3 {
        match self {
            LegIk::DirectMotor(ik) => ik.resting_position(),
        }
    }

    pub fn bone_length(&self) -> f64 {
        match self {
            LegIk::DirectMotor(ik) => ik.bone_length,
        }
    }

    pub fn has_valid_bone_length(&self) -> bool {
        match self {
            LegIk::DirectMotor(ik) => ik.has_valid_bone_length(),
        }
    }
}

/// Factory for default direct-drive legs
pub fn direct_motor_factory() -> impl Fn() -> LegIk {
    || LegIk::DirectMotor(DirectMotorIk::default())
}
