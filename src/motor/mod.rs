// Motor control module for the quadruped legs
//
// Provides:
// - Leg inverse kinematics (foot target -> joint angles)
// - The named motor sink the joint angles are sent to

pub mod ik;
mod sink;

pub use ik::{DIRECT_MOTOR_NAMES, DirectMotorIk, JOINT_LIMIT, LegIk, direct_motor_factory};
pub use sink::{MappedMotorSink, MotorError, MotorSink, UNASSIGNED_CHANNEL};
