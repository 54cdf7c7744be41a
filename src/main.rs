use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quadruped_runtime::config::{DEFAULT_CONFIG_PATH, LOOP_HZ, RobotConfig};
use quadruped_runtime::imu::{DummyRotationSensor, OrientationEstimator, RotationSensor};
use quadruped_runtime::motor::MappedMotorSink;
use quadruped_runtime::quadruped::Quadruped;
use quadruped_runtime::runtime::{self, Runtime};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stand the quadruped up and keep it level using the IMU
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Robot config document (JSON)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the IMU serial port from the config
    #[arg(long)]
    imu_port: Option<String>,

    /// Run without an IMU (body assumed level)
    #[arg(long)]
    no_imu: bool,

    /// Calibrate the IMU before starting (robot must be still and level)
    #[arg(long)]
    calibrate: bool,

    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ)]
    hz: u64,

    /// Write a default config to --config and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    if args.write_default_config {
        RobotConfig::default().save(&args.config)?;
        return Ok(());
    }

    let mut config = if args.config.exists() {
        RobotConfig::load(&args.config)?
    } else {
        warn!(
            "No config at {}, using defaults",
            args.config.display()
        );
        RobotConfig::default()
    };
    if let Some(port) = args.imu_port {
        config.imu.port_name = port;
    }

    let sensor: Box<dyn RotationSensor> = if args.no_imu {
        info!("Running without IMU");
        Box::new(DummyRotationSensor)
    } else {
        let imu_config = config.imu.clone();
        let calibrate = args.calibrate;
        // Opening, setup and calibration all block on the serial port
        let estimator = tokio::task::spawn_blocking(move || {
            let mut estimator = OrientationEstimator::open(imu_config)?;
            estimator.setup()?;
            if calibrate {
                estimator.calibrate()?;
            }
            Ok::<_, BoxError>(estimator)
        })
        .await??;
        Box::new(estimator)
    };

    let motors = MappedMotorSink::with_mapping(config.motor_mapping.clone());
    let quadruped = Quadruped::from_legs(config.legs_in_order()?, motors, &config.extra_motors)
        .with_body_dimensions(config.body_dimension_x, config.body_dimension_z);

    let mut runtime = Runtime::new(sensor, quadruped);
    runtime::run(&mut runtime, args.hz).await?;
    Ok(())
}
