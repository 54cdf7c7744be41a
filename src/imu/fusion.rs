// Complementary filter: gyro integration with bounded accelerometer pull
//
// The gyro is integrated in the body (local) frame. The accelerometer only
// observes the up direction, so its correction is applied in the global frame
// and leaves heading untouched.

use crate::math::{Quaternion, UP};

use super::packet::RotationPacket;

/// Orientation filter state for one estimator
#[derive(Debug, Clone)]
pub struct Fusion {
    orientation: Quaternion,
    calibration: RotationPacket,
    /// Maximum accelerometer correction rate (deg/s)
    max_correction_rate: f64,
}

impl Fusion {
    pub fn new(orientation: Quaternion, calibration: RotationPacket, max_correction_rate: f64) -> Self {
        Self {
            orientation,
            calibration,
            max_correction_rate,
        }
    }

    pub fn orientation(&self) -> Quaternion {
        self.orientation
    }

    /// Fuse one raw packet observed `dt` seconds after the previous one
    pub fn step(&mut self, raw: RotationPacket, dt: f64) -> Quaternion {
        let packet = raw - self.calibration;
        let mut orientation = self.orientation;

        // Negative angle: the sensor's rate sign is opposite to the right-hand rule
        if let Some(axis) = packet.gyro.try_unit() {
            let angle = -packet.gyro.length() * dt;
            orientation = orientation.rotate_by_local(Quaternion::from_angle_axis(axis, angle));
        }

        // Where the accelerometer says up is, seen through the current estimate.
        // If the estimate were perfect this would equal UP.
        if let Some(accel_dir) = packet.accel.try_unit() {
            let accel_up = accel_dir.rotated(orientation);
            let error = accel_up.angle_to(UP);
            if error > 0.0 {
                let axis = Quaternion::from_to(accel_up, UP).vector();
                let angle = (error / 180.0).min(1.0) * self.max_correction_rate * dt;
                orientation =
                    orientation.rotate_by_global(Quaternion::from_angle_axis(axis, angle));
            }
        }

        self.orientation = orientation.unit();
        self.orientation
    }
}
