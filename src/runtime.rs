// Fixed-rate control loop
// Each tick: read the orientation, pick foot targets that keep the feet where a
// level body would put them, and push one full pose to the motors.

use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::imu::{EstimatorError, RotationSensor};
use crate::math::{Quaternion, Vector3};
use crate::motor::{MotorError, MotorSink};
use crate::quadruped::{LegId, Quadruped};

/// Error types for the control loop
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Orientation sensor failed: {0}")]
    Sensor(#[from] EstimatorError),

    #[error("Motor command failed: {0}")]
    Motor(#[from] MotorError),
}

/// Foot target that keeps the foot at its level-stance world position.
///
/// `rest` is the foot's hip-relative position when the body is level;
/// `orientation` is the body's tilt with heading removed.
pub fn level_stance_target(orientation: Quaternion, shoulder: Vector3, rest: Vector3) -> Vector3 {
    let foot_world = shoulder + rest;
    orientation.inverse().apply(foot_world) - shoulder
}

pub struct Runtime<M> {
    sensor: Box<dyn RotationSensor>,
    quadruped: Quadruped<M>,
    /// Counter-rotate foot targets against body tilt
    leveling: bool,
    ticks: u64,
}

impl<M: MotorSink> Runtime<M> {
    pub fn new(sensor: Box<dyn RotationSensor>, quadruped: Quadruped<M>) -> Self {
        Self {
            sensor,
            quadruped,
            leveling: true,
            ticks: 0,
        }
    }

    pub fn with_leveling(mut self, leveling: bool) -> Self {
        self.leveling = leveling;
        self
    }

    pub fn quadruped(&self) -> &Quadruped<M> {
        &self.quadruped
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one control cycle
    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        self.sensor.check()?;

        let tilt = if self.leveling {
            self.sensor.orientation().no_yaw()
        } else {
            Quaternion::IDENTITY
        };

        for leg in LegId::ALL {
            let rest = self.quadruped.leg(leg).resting_position();
            let shoulder = self.quadruped.shoulder_offset(leg);
            let target = level_stance_target(tilt, shoulder, rest);
            self.quadruped.set_leg_target(leg, target);
        }
        self.quadruped.update()?;

        self.ticks += 1;
        if self.ticks % 250 == 0 {
            debug!(ticks = self.ticks, "Body tilt {}", tilt);
        }
        Ok(())
    }

    /// Recalibrate the orientation sensor (the robot must be still)
    pub fn calibrate(&mut self) -> Result<(), RuntimeError> {
        self.sensor.calibrate()?;
        Ok(())
    }
}

/// Tick `runtime` at `hz` until Ctrl+C or an error
pub async fn run<M: MotorSink>(runtime: &mut Runtime<M>, hz: u64) -> Result<(), RuntimeError> {
    let mut tick = interval(Duration::from_millis(1000 / hz.max(1)));
    // A late tick should not trigger a burst of catch-up poses
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Runtime started: {}Hz loop", hz);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = runtime.tick() {
                    warn!("Control loop stopping: {}", e);
                    return Err(e);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested after {} ticks", runtime.ticks());
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::DummyRotationSensor;
    use crate::math::{FORWARD, LEFT};
    use crate::motor::{MappedMotorSink, direct_motor_factory};

    /// Reports a fixed orientation
    struct FixedSensor(Quaternion);

    impl RotationSensor for FixedSensor {
        fn orientation(&self) -> Quaternion {
            self.0
        }

        fn calibrate(&mut self) -> Result<(), EstimatorError> {
            self.0 = Quaternion::IDENTITY;
            Ok(())
        }
    }

    /// Fails its health check
    struct BrokenSensor;

    impl RotationSensor for BrokenSensor {
        fn orientation(&self) -> Quaternion {
            Quaternion::IDENTITY
        }

        fn calibrate(&mut self) -> Result<(), EstimatorError> {
            Err(EstimatorError::WorkerLost)
        }

        fn check(&mut self) -> Result<(), EstimatorError> {
            Err(EstimatorError::WorkerLost)
        }
    }

    fn runtime(sensor: Box<dyn RotationSensor>) -> Runtime<MappedMotorSink> {
        let quadruped = Quadruped::new(direct_motor_factory(), MappedMotorSink::new())
            .with_body_dimensions(20.0, 10.0);
        Runtime::new(sensor, quadruped)
    }

    #[test]
    fn test_level_body_holds_rest_pose() {
        let mut rt = runtime(Box::new(DummyRotationSensor));
        rt.tick().unwrap();
        assert_eq!(rt.ticks(), 1);
        let sink = rt.quadruped().motors();
        for name in rt.quadruped().motor_names() {
            let angle = sink.angle(name).unwrap();
            assert!(angle.abs() < 1e-9, "{} = {}", name, angle);
        }
    }

    #[test]
    fn test_stance_target_identity() {
        let rest = Vector3::new(0.0, 8.0, 0.0);
        let shoulder = Vector3::new(10.0, 0.0, 5.0);
        let t = level_stance_target(Quaternion::IDENTITY, shoulder, rest);
        assert!(t.approx_eq(rest, 1e-12));
    }

    #[test]
    fn test_pitched_body_moves_front_and_back_differently() {
        // Nose down: front feet need to reach less far, back feet further
        let pitch = Quaternion::from_angle_axis(LEFT, 10.0);
        let mut rt = runtime(Box::new(FixedSensor(pitch)));
        rt.tick().unwrap();

        let q = rt.quadruped();
        let front = q.leg_target(LegId::FrontLeft).length();
        let back = q.leg_target(LegId::BackLeft).length();
        assert!((front - back).abs() > 0.1, "front {} back {}", front, back);

        // Left/right pairs see the same pitch
        let fr = q.leg_target(LegId::FrontRight).length();
        assert!((front - fr).abs() < 1e-9);
    }

    #[test]
    fn test_leveling_disabled_ignores_tilt() {
        let roll = Quaternion::from_angle_axis(FORWARD, 15.0);
        let mut rt = runtime(Box::new(FixedSensor(roll))).with_leveling(false);
        rt.tick().unwrap();
        for leg in LegId::ALL {
            let q = rt.quadruped();
            assert_eq!(q.leg_target(leg), q.leg(leg).resting_position());
        }
    }

    #[test]
    fn test_sensor_failure_stops_tick() {
        let mut rt = runtime(Box::new(BrokenSensor));
        assert!(matches!(rt.tick(), Err(RuntimeError::Sensor(_))));
        assert_eq!(rt.ticks(), 0);
        assert!(rt.calibrate().is_err());
    }
}
