// Loop timing, defaults, and the robot configuration document
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::imu::EstimatorConfig;
use crate::motor::{LegIk, UNASSIGNED_CHANNEL};
use crate::quadruped::{LegId, motor_name};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Robot configuration file
pub const DEFAULT_CONFIG_PATH: &str = "robot.json";

// IMU serial link (Arduino streaming raw MPU-6050 readings)
pub const DEFAULT_IMU_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_IMU_BAUDRATE: u32 = 115_200;

// How long calibrate/restart wait for the fusion thread to let go of the port
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Error types for loading and saving the config document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config has no entry for leg {0}")]
    MissingLeg(LegId),

    #[error("Leg {leg} has invalid bone length {length}")]
    InvalidBoneLength { leg: LegId, length: f64 },

    #[error("IMU axes remap is not an orthonormal frame")]
    InvalidAxes,
}

/// Everything needed to build the robot, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub legs: BTreeMap<LegId, LegIk>,
    /// Motor name to output channel (-1 for unassigned)
    pub motor_mapping: BTreeMap<String, i32>,
    /// Extra (non-leg) motors, e.g. a head or tail servo
    pub extra_motors: Vec<String>,
    pub body_dimension_x: f64,
    pub body_dimension_z: f64,
    pub imu: EstimatorConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        let legs: BTreeMap<LegId, LegIk> = LegId::ALL
            .into_iter()
            .map(|leg| (leg, LegIk::default()))
            .collect();
        let motor_mapping = legs
            .iter()
            .flat_map(|(&leg, ik)| {
                ik.motor_names()
                    .iter()
                    .map(move |joint| (motor_name(leg, joint), UNASSIGNED_CHANNEL))
            })
            .collect();
        Self {
            legs,
            motor_mapping,
            extra_motors: Vec::new(),
            body_dimension_x: 20.0,
            body_dimension_z: 10.0,
            imu: EstimatorConfig::default(),
        }
    }
}

impl RobotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading robot config from {}", path.display());
        let data = fs::read_to_string(path)?;
        let config: RobotConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject documents the solvers or the estimator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (leg, ik) in LegId::ALL.into_iter().zip(self.legs_in_order()?) {
            if !ik.has_valid_bone_length() {
                return Err(ConfigError::InvalidBoneLength {
                    leg,
                    length: ik.bone_length(),
                });
            }
        }
        if !self.imu.axes.is_orthonormal() {
            return Err(ConfigError::InvalidAxes);
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        info!("Saved robot config to {}", path.display());
        Ok(())
    }

    /// Leg solvers in [`LegId::ALL`] order
    pub fn legs_in_order(&self) -> Result<[LegIk; 4], ConfigError> {
        let mut legs = [LegIk::default(); 4];
        for (slot, leg) in legs.iter_mut().zip(LegId::ALL) {
            *slot = *self.legs.get(&leg).ok_or(ConfigError::MissingLeg(leg))?;
        }
        Ok(legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::DirectMotorIk;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("quadruped-runtime-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_default_has_every_leg_and_motor() {
        let config = RobotConfig::default();
        assert_eq!(config.legs.len(), 4);
        assert_eq!(config.motor_mapping.len(), 12);
        assert_eq!(config.motor_mapping["back_left.hip_x"], UNASSIGNED_CHANNEL);
        assert!(config.legs_in_order().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = RobotConfig::default();
        config.legs.insert(
            LegId::FrontRight,
            LegIk::DirectMotor(DirectMotorIk {
                reverse_hip_z_joint: true,
                bone_length: 8.0,
                ..DirectMotorIk::default()
            }),
        );
        config.motor_mapping.insert("front_right.knee".to_string(), 5);
        config.imu.max_correction_rate = 30.0;

        let path = temp_path("save-load.json");
        config.save(&path).unwrap();
        let loaded = RobotConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let json = r#"{
            "legs": {
                "front_left": {"kind": "direct_motor", "bone_length": 5.0},
                "front_right": {"kind": "direct_motor"},
                "back_left": {"kind": "direct_motor"},
                "back_right": {"kind": "direct_motor", "flip_x_axis": true}
            },
            "imu": {"port_name": "/dev/ttyACM0", "acc_speed": 20.0, "rev_gyro_up": true}
        }"#;
        let config: RobotConfig = serde_json::from_str(json).unwrap();
        let legs = config.legs_in_order().unwrap();
        assert_eq!(legs[0].resting_position().y, (2.0f64 * 25.0).sqrt());
        assert_eq!(config.imu.port_name, "/dev/ttyACM0");
        assert_eq!(config.imu.max_correction_rate, 20.0);
        assert!(config.imu.reversal.up);
        assert!(!config.imu.reversal.left);
        assert_eq!(config.imu.baud_rate, DEFAULT_IMU_BAUDRATE);
        assert_eq!(config.body_dimension_x, 20.0);
    }

    #[test]
    fn test_rejects_unknown_leg_and_missing_leg() {
        let unknown = r#"{"legs": {"middle": {"kind": "direct_motor"}}}"#;
        assert!(serde_json::from_str::<RobotConfig>(unknown).is_err());

        let missing = r#"{"legs": {"front_left": {"kind": "direct_motor"}}}"#;
        let path = temp_path("missing-leg.json");
        fs::write(&path, missing).unwrap();
        let err = RobotConfig::load(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::MissingLeg(LegId::FrontRight)));
    }

    #[test]
    fn test_default_is_valid() {
        RobotConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_bone_length() {
        let mut config = RobotConfig::default();
        config.legs.insert(
            LegId::BackLeft,
            LegIk::DirectMotor(DirectMotorIk::with_bone_length(0.0)),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBoneLength {
                leg: LegId::BackLeft,
                ..
            })
        ));

        let path = temp_path("zero-bone.json");
        config.save(&path).unwrap();
        let err = RobotConfig::load(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidBoneLength { .. }));
    }

    #[test]
    fn test_rejects_degenerate_imu_axes() {
        let json = r#"{
            "legs": {
                "front_left": {"kind": "direct_motor"},
                "front_right": {"kind": "direct_motor"},
                "back_left": {"kind": "direct_motor"},
                "back_right": {"kind": "direct_motor"}
            },
            "imu": {"axes_remap": {
                "src-forward": {"x": 1.0, "y": 0.0, "z": 0.0},
                "src-up": {"x": 1.0, "y": 0.0, "z": 0.0},
                "src-left": {"x": 0.0, "y": 0.0, "z": 0.0},
                "target-forward": {"x": 1.0, "y": 0.0, "z": 0.0},
                "target-up": {"x": 0.0, "y": -1.0, "z": 0.0},
                "target-left": {"x": 0.0, "y": 0.0, "z": 1.0}
            }}
        }"#;
        let path = temp_path("bad-axes.json");
        fs::write(&path, json).unwrap();
        let err = RobotConfig::load(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidAxes), "{}", err);
    }
}
