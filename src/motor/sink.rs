// Named motor command sink
//
// The hardware driver sits behind this trait. Names are registered once,
// then angles in [-90, 90] degrees are set by name.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::ik::JOINT_LIMIT;

/// Channel value for a motor that has no hardware output assigned
pub const UNASSIGNED_CHANNEL: i32 = -1;

/// Error types for motor commands
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Motor {0:?} is not registered")]
    UnknownMotor(String),

    #[error("Motor {name:?} rejected command: {reason}")]
    Rejected { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Something that can drive named motors
pub trait MotorSink {
    /// Register every motor name that will ever be set. Called once.
    fn register_motor_names(&mut self, names: &[String]);

    /// Set a registered motor to an angle between -90 and 90 degrees
    fn set_motor(&mut self, name: &str, degrees: f64) -> Result<()>;
}

/// Maps motor names to output channels and keeps the last commanded angle.
///
/// Stands in for the servo driver: commands are logged with their channel,
/// and servo angles (0..180) are available for whatever writes them out.
#[derive(Debug, Clone, Default)]
pub struct MappedMotorSink {
    mapping: BTreeMap<String, i32>,
    angles: BTreeMap<String, f64>,
}

impl MappedMotorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a saved name-to-channel mapping
    pub fn with_mapping(mapping: BTreeMap<String, i32>) -> Self {
        Self {
            mapping,
            angles: BTreeMap::new(),
        }
    }

    pub fn mapping(&self) -> &BTreeMap<String, i32> {
        &self.mapping
    }

    pub fn channel(&self, name: &str) -> Option<i32> {
        self.mapping.get(name).copied()
    }

    /// Last commanded angle in [-90, 90]
    pub fn angle(&self, name: &str) -> Option<f64> {
        self.angles.get(name).copied()
    }

    /// Last commanded angle as a servo position in [0, 180]
    pub fn servo_angle(&self, name: &str) -> Option<f64> {
        self.angle(name).map(|a| a + JOINT_LIMIT)
    }
}

impl MotorSink for MappedMotorSink {
    fn register_motor_names(&mut self, names: &[String]) {
        // Keep channels that were loaded from config; new names start unassigned
        let mut mapping = BTreeMap::new();
        for name in names {
            let channel = self
                .mapping
                .get(name)
                .copied()
                .unwrap_or(UNASSIGNED_CHANNEL);
            mapping.insert(name.clone(), channel);
        }
        for stale in self.mapping.keys().filter(|k| !mapping.contains_key(*k)) {
            warn!("Dropping mapping for unknown motor {}", stale);
        }
        let unassigned = mapping
            .values()
            .filter(|&&c| c == UNASSIGNED_CHANNEL)
            .count();
        info!(
            "Registered {} motors ({} without a channel)",
            mapping.len(),
            unassigned
        );
        self.mapping = mapping;
    }

    fn set_motor(&mut self, name: &str, degrees: f64) -> Result<()> {
        let Some(&channel) = self.mapping.get(name) else {
            return Err(MotorError::UnknownMotor(name.to_string()));
        };
        if !degrees.is_finite() {
            return Err(MotorError::Rejected {
                name: name.to_string(),
                reason: format!("angle {} is not finite", degrees),
            });
        }
        let degrees = degrees.clamp(-JOINT_LIMIT, JOINT_LIMIT);
        debug!("Set motor {} (channel {}) to {:.1}", name, channel, degrees);
        self.angles.insert(name.to_string(), degrees);
        Ok(())
    }
}
