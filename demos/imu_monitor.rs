// IMU monitor: check the sensor stream and watch the fused orientation
//
// Does not touch any motors - completely safe to run on a powered robot.
//
// Usage: cargo run --example imu_monitor -- [port] [--calibrate]
// Example: cargo run --example imu_monitor -- /dev/ttyUSB0 --calibrate

use std::thread::sleep;
use std::time::Duration;

use quadruped_runtime::config::DEFAULT_IMU_PORT;
use quadruped_runtime::imu::{EstimatorConfig, OrientationEstimator};
use quadruped_runtime::math::{FORWARD, LEFT, UP};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args
        .next()
        .filter(|a| !a.starts_with("--"))
        .unwrap_or_else(|| DEFAULT_IMU_PORT.to_string());
    let calibrate = std::env::args().any(|a| a == "--calibrate");

    println!("IMU monitor (read-only)");
    println!("Serial port: {}", port);
    println!();

    let config = EstimatorConfig {
        port_name: port,
        ..EstimatorConfig::default()
    };

    println!("Step 1: Opening serial port...");
    let mut imu = match OrientationEstimator::open(config) {
        Ok(imu) => {
            println!("  ✓ Serial port opened");
            imu
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Verify the Arduino is flashed with the raw MPU sketch");
            println!("  - On Linux, check you are in the dialout group");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Starting fusion...");
    imu.setup()?;
    println!("  ✓ Running");
    println!();

    if calibrate {
        println!("Step 3: Calibrating - keep the robot still and level...");
        imu.calibrate()?;
        let bias = imu.calibration();
        println!("  ✓ Gyro bias {}", bias.gyro);
        println!("  ✓ Accel bias {}", bias.accel);
        println!();
    }

    println!("Orientation (Ctrl+C to quit):");
    loop {
        let q = imu.orientation();
        imu.check()?;
        println!(
            "  q={}  heading={:6.1}  fwd={}  left={}  up={}",
            q,
            q.heading_angle(),
            FORWARD.rotated(q),
            LEFT.rotated(q),
            UP.rotated(q)
        );
        sleep(Duration::from_millis(200));
    }
}
