// Orientation source abstraction
//
// Lets the runtime drive the robot with or without a physical IMU.

use std::io::Read;

use super::estimator::{EstimatorError, EstimatorState, OrientationEstimator};
use crate::math::Quaternion;

/// Anything that reports the body orientation in the global frame
pub trait RotationSensor: Send {
    /// Latest orientation. Must not block.
    fn orientation(&self) -> Quaternion;

    /// Re-zero the sensor, blocking until done
    fn calibrate(&mut self) -> Result<(), EstimatorError>;

    /// Report a failure that happened in the background, if any
    fn check(&mut self) -> Result<(), EstimatorError> {
        Ok(())
    }
}

/// Sensor that always reports a level, unrotated body
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyRotationSensor;

impl RotationSensor for DummyRotationSensor {
    fn orientation(&self) -> Quaternion {
        Quaternion::IDENTITY
    }

    fn calibrate(&mut self) -> Result<(), EstimatorError> {
        Ok(())
    }
}

impl<R: Read + Send + 'static> RotationSensor for OrientationEstimator<R> {
    fn orientation(&self) -> Quaternion {
        OrientationEstimator::orientation(self)
    }

    fn calibrate(&mut self) -> Result<(), EstimatorError> {
        OrientationEstimator::calibrate(self)
    }

    fn check(&mut self) -> Result<(), EstimatorError> {
        OrientationEstimator::check(self)?;
        match self.state() {
            EstimatorState::Running | EstimatorState::StopRequested => Ok(()),
            state => Err(EstimatorError::InvalidState {
                operation: "report orientation",
                state,
            }),
        }
    }
}
