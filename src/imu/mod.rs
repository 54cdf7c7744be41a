// IMU module: raw gyro/accelerometer stream to orientation
//
// Provides:
// - Bracket-framed packet parsing with axis remapping
// - Complementary filter fusion
// - Background estimator with calibration/restart handshake

pub mod estimator;
pub mod fusion;
pub mod packet;
mod sensor;

pub use estimator::{EstimatorConfig, EstimatorError, EstimatorState, OrientationEstimator};
pub use packet::{GyroReversal, PacketReader, RotationPacket};
pub use sensor::{DummyRotationSensor, RotationSensor};
