// Four-legged body: leg targets in, named motor commands out
//
// Targets are cached per leg and only turned into motor commands on update().

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::math::{Vector3, ZERO};
use crate::motor::{LegIk, MotorError, MotorSink};

/// Leg identities, in update order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegId {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl LegId {
    pub const ALL: [LegId; 4] = [
        LegId::FrontLeft,
        LegId::FrontRight,
        LegId::BackLeft,
        LegId::BackRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LegId::FrontLeft => "front_left",
            LegId::FrontRight => "front_right",
            LegId::BackLeft => "back_left",
            LegId::BackRight => "back_right",
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, LegId::FrontLeft | LegId::FrontRight)
    }

    pub fn is_left(self) -> bool {
        matches!(self, LegId::FrontLeft | LegId::BackLeft)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown leg {0:?}")]
pub struct UnknownLeg(pub String);

impl FromStr for LegId {
    type Err = UnknownLeg;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LegId::ALL
            .into_iter()
            .find(|leg| leg.as_str() == s)
            .ok_or_else(|| UnknownLeg(s.to_string()))
    }
}

/// Motor name for one joint of one leg: `"<leg>.<joint>"`
pub fn motor_name(leg: LegId, joint: &str) -> String {
    format!("{}.{}", leg, joint)
}

/// Four leg solvers sharing one motor sink
pub struct Quadruped<M> {
    legs: [LegIk; 4],
    motors: M,
    /// Body length, front to back shoulder
    body_dimension_x: f64,
    /// Body width, left to right shoulder
    body_dimension_z: f64,
    targets: [Vector3; 4],
    rotations: [Vec<f64>; 4],
    leg_motor_names: [Vec<String>; 4],
    motor_names: Vec<String>,
}

impl<M: MotorSink> Quadruped<M> {
    /// Build with one fresh solver per leg from `new_ik`
    pub fn new(new_ik: impl Fn() -> LegIk, motors: M) -> Self {
        Self::with_extra_motors(new_ik, motors, &[])
    }

    /// Like [`Quadruped::new`], also registering `extra_motors` with the sink
    pub fn with_extra_motors(new_ik: impl Fn() -> LegIk, motors: M, extra_motors: &[String]) -> Self {
        let legs = LegId::ALL.map(|_| new_ik());
        Self::from_legs(legs, motors, extra_motors)
    }

    /// Build from explicit solvers, indexed in [`LegId::ALL`] order
    pub fn from_legs(legs: [LegIk; 4], mut motors: M, extra_motors: &[String]) -> Self {
        let targets = legs.map(|ik| ik.resting_position());
        let leg_motor_names = LegId::ALL.map(|leg| {
            legs[leg.index()]
                .motor_names()
                .iter()
                .map(|joint| motor_name(leg, joint))
                .collect::<Vec<_>>()
        });

        let mut motor_names: Vec<String> = leg_motor_names.iter().flatten().cloned().collect();
        motor_names.extend(extra_motors.iter().cloned());
        motors.register_motor_names(&motor_names);
        info!("Quadruped ready with {} motors", motor_names.len());

        Self {
            legs,
            motors,
            body_dimension_x: 0.0,
            body_dimension_z: 0.0,
            targets,
            rotations: Default::default(),
            leg_motor_names,
            motor_names,
        }
    }

    /// Set full body length (x) and width (z) between shoulders
    pub fn with_body_dimensions(mut self, x: f64, z: f64) -> Self {
        self.body_dimension_x = x;
        self.body_dimension_z = z;
        self
    }

    /// Every registered motor name, legs first then extras
    pub fn motor_names(&self) -> &[String] {
        &self.motor_names
    }

    pub fn leg(&self, leg: LegId) -> &LegIk {
        &self.legs[leg.index()]
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }

    pub fn motors_mut(&mut self) -> &mut M {
        &mut self.motors
    }

    /// Vector from body center to the leg's shoulder joint
    pub fn shoulder_offset(&self, leg: LegId) -> Vector3 {
        let fwd = if leg.is_front() { 1.0 } else { -1.0 };
        let left = if leg.is_left() { 1.0 } else { -1.0 };
        Vector3::new(
            fwd * self.body_dimension_x / 2.0,
            0.0,
            left * self.body_dimension_z / 2.0,
        )
    }

    /// [`Quadruped::shoulder_offset`] by leg name; unknown names give zero
    pub fn shoulder_offset_named(&self, leg: &str) -> Vector3 {
        leg.parse()
            .map(|leg| self.shoulder_offset(leg))
            .unwrap_or(ZERO)
    }

    /// Foot target for the next update, relative to the leg's hip.
    /// Nothing moves until [`Quadruped::update`].
    pub fn set_leg_target(&mut self, leg: LegId, position: Vector3) {
        self.targets[leg.index()] = position;
    }

    pub fn leg_target(&self, leg: LegId) -> Vector3 {
        self.targets[leg.index()]
    }

    /// Joint angles sent on the last update (empty before the first)
    pub fn last_rotations(&self, leg: LegId) -> &[f64] {
        &self.rotations[leg.index()]
    }

    /// Solve every leg, then command every motor.
    ///
    /// Nothing is sent unless every leg solves to finite angles.
    pub fn update(&mut self) -> Result<(), MotorError> {
        let mut solved: [Vec<f64>; 4] = Default::default();
        for leg in LegId::ALL {
            let i = leg.index();
            let angles = self.legs[i].calculate_motor_rotations(self.targets[i]);
            for (name, &angle) in self.leg_motor_names[i].iter().zip(&angles) {
                if !angle.is_finite() {
                    return Err(MotorError::Rejected {
                        name: name.clone(),
                        reason: format!("angle {} is not finite", angle),
                    });
                }
            }
            solved[i] = angles;
        }
        self.rotations = solved;

        for leg in LegId::ALL {
            let i = leg.index();
            for (name, &angle) in self.leg_motor_names[i].iter().zip(&self.rotations[i]) {
                self.motors.set_motor(name, angle)?;
            }
        }
        debug!("Quadruped update sent");
        Ok(())
    }

    /// Drive a motor right away instead of on the next update
    pub fn set_extra_motor_now(&mut self, name: &str, angle: f64) -> Result<(), MotorError> {
        if !self.motor_names.iter().any(|n| n == name) {
            return Err(MotorError::UnknownMotor(name.to_string()));
        }
        self.motors.set_motor(name, angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{DirectMotorIk, direct_motor_factory};

    /// Records every call made to it
    #[derive(Default)]
    struct RecordingSink {
        registered: Vec<Vec<String>>,
        commands: Vec<(String, f64)>,
    }

    impl MotorSink for RecordingSink {
        fn register_motor_names(&mut self, names: &[String]) {
            self.registered.push(names.to_vec());
        }

        fn set_motor(&mut self, name: &str, degrees: f64) -> Result<(), MotorError> {
            self.commands.push((name.to_string(), degrees));
            Ok(())
        }
    }

    fn quadruped() -> Quadruped<RecordingSink> {
        Quadruped::new(direct_motor_factory(), RecordingSink::default())
            .with_body_dimensions(20.0, 10.0)
    }

    #[test]
    fn test_registers_names_once() {
        let q = quadruped();
        let registered = &q.motors().registered;
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].len(), 12);
        assert_eq!(registered[0][0], "front_left.hip_z");
        assert_eq!(registered[0][2], "front_left.knee");
        assert_eq!(registered[0][11], "back_right.knee");
        assert!(q.motors().commands.is_empty());
    }

    #[test]
    fn test_extra_motors_registered() {
        let extra = vec!["head.pan".to_string(), "tail".to_string()];
        let mut q = Quadruped::with_extra_motors(direct_motor_factory(), RecordingSink::default(), &extra);
        assert_eq!(q.motor_names().len(), 14);
        assert_eq!(&q.motor_names()[12..], &extra[..]);

        q.set_extra_motor_now("tail", 15.0).unwrap();
        assert_eq!(q.motors().commands, vec![("tail".to_string(), 15.0)]);
        assert!(q.set_extra_motor_now("wing", 1.0).is_err());

        // Extras are not driven by update
        q.update().unwrap();
        assert_eq!(q.motors().commands.len(), 1 + 12);
    }

    #[test]
    fn test_update_issues_one_command_per_joint() {
        let mut q = quadruped();
        q.update().unwrap();
        let registered = q.motors().registered[0].clone();
        let commands = &q.motors().commands;
        assert_eq!(commands.len(), 12);
        for (name, angle) in commands {
            assert!(registered.contains(name), "{} not registered", name);
            assert!((-90.0..=90.0).contains(angle));
        }
    }

    #[test]
    fn test_defaults_to_resting_pose() {
        let mut q = quadruped();
        for leg in LegId::ALL {
            assert_eq!(q.leg_target(leg), q.leg(leg).resting_position());
        }
        q.update().unwrap();
        for (_, angle) in &q.motors().commands {
            assert!(angle.abs() < 1e-9);
        }
    }

    #[test]
    fn test_unsolvable_leg_sends_nothing() {
        let mut q = quadruped();
        q.update().unwrap();
        let before = q.last_rotations(LegId::FrontLeft).to_vec();
        let sent = q.motors().commands.len();

        q.set_leg_target(LegId::FrontLeft, Vector3::new(3.0, 7.0, 0.0));
        q.set_leg_target(LegId::BackRight, Vector3::new(f64::NAN, 8.0, 0.0));
        let err = q.update().unwrap_err();
        assert!(
            matches!(&err, MotorError::Rejected { name, .. } if name.starts_with("back_right.")),
            "{}",
            err
        );

        // No partial pose: earlier legs were not commanded either
        assert_eq!(q.motors().commands.len(), sent);
        assert_eq!(q.last_rotations(LegId::FrontLeft), &before[..]);
    }

    #[test]
    fn test_set_leg_target_is_deferred() {
        let mut q = quadruped();
        let target = Vector3::new(2.0, 7.0, 1.0);
        q.set_leg_target(LegId::BackLeft, target);
        assert!(q.motors().commands.is_empty());
        assert!(q.last_rotations(LegId::BackLeft).is_empty());

        q.update().unwrap();
        let expected = DirectMotorIk::default().calculate_motor_rotations(target);
        assert_eq!(q.last_rotations(LegId::BackLeft), &expected[..]);
        let sent: Vec<f64> = q
            .motors()
            .commands
            .iter()
            .filter(|(n, _)| n.starts_with("back_left."))
            .map(|&(_, a)| a)
            .collect();
        assert_eq!(sent, expected.to_vec());
    }

    #[test]
    fn test_shoulder_offsets() {
        let q = quadruped();
        assert_eq!(q.shoulder_offset(LegId::FrontLeft), Vector3::new(10.0, 0.0, 5.0));
        assert_eq!(q.shoulder_offset(LegId::FrontRight), Vector3::new(10.0, 0.0, -5.0));
        assert_eq!(q.shoulder_offset(LegId::BackLeft), Vector3::new(-10.0, 0.0, 5.0));
        assert_eq!(q.shoulder_offset(LegId::BackRight), Vector3::new(-10.0, 0.0, -5.0));
        assert_eq!(q.shoulder_offset_named("back_right"), Vector3::new(-10.0, 0.0, -5.0));
        assert_eq!(q.shoulder_offset_named("middle"), ZERO);
    }

    #[test]
    fn test_leg_id_parsing() {
        for leg in LegId::ALL {
            assert_eq!(leg.as_str().parse::<LegId>(), Ok(leg));
        }
        assert!("front".parse::<LegId>().is_err());
        assert_eq!(
            serde_json::to_string(&LegId::FrontRight).unwrap(),
            r#""front_right""#
        );
    }
}
