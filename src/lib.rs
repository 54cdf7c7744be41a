pub mod config;
pub mod imu;
pub mod math;
pub mod motor;
pub mod quadruped;
pub mod runtime;
