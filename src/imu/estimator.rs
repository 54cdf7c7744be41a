// Background orientation estimator
//
// A dedicated thread owns the byte stream while running: it reads packets,
// fuses them and publishes the orientation on a watch channel. Stopping is
// cooperative (checked once per packet); the worker hands the stream back
// over a channel so the caller can sample calibration data directly.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::fusion::Fusion;
use super::packet::{GyroReversal, PacketReader, RotationPacket};
use crate::config::{DEFAULT_IMU_BAUDRATE, DEFAULT_IMU_PORT, DEFAULT_STOP_TIMEOUT};
use crate::math::{AxesRemapper, Quaternion, Vector3, FORWARD, LEFT, UP};

/// Expected accelerometer bias along the up axis when resting level
const REST_UP_BIAS: f64 = 0.5;

/// Lifecycle of the background fusion task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Stopped,
    Running,
    StopRequested,
    /// The byte stream failed; the estimator must be recreated
    Failed,
}

/// Error types for the orientation estimator
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot {operation} while estimator is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: EstimatorState,
    },

    #[error("Background task did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Background task exited without returning the stream")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, EstimatorError>;

/// Estimator configuration as stored in the robot config document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub port_name: String,
    pub baud_rate: u32,
    #[serde(rename = "axes_remap")]
    pub axes: AxesRemapper,
    #[serde(flatten)]
    pub reversal: GyroReversal,
    /// Maximum accelerometer correction rate (deg/s)
    #[serde(rename = "acc_speed")]
    pub max_correction_rate: f64,
    pub calibration_samples: usize,
    pub stop_timeout_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_IMU_PORT.to_string(),
            baud_rate: DEFAULT_IMU_BAUDRATE,
            // Sensor reports z up and y left
            axes: AxesRemapper::new(FORWARD, LEFT, UP),
            reversal: GyroReversal::default(),
            max_correction_rate: 45.0,
            calibration_samples: 100,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,
        }
    }
}

impl EstimatorConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// What the worker hands back when it exits
type WorkerExit<R> = io::Result<PacketReader<R>>;

struct Worker<R> {
    stop: Arc<AtomicBool>,
    exit_rx: Receiver<WorkerExit<R>>,
    _handle: JoinHandle<()>,
}

/// Fuses a raw IMU byte stream into an orientation on a background thread
pub struct OrientationEstimator<R> {
    config: EstimatorConfig,
    state: EstimatorState,
    calibration: RotationPacket,
    orientation_tx: Arc<watch::Sender<Quaternion>>,
    orientation_rx: watch::Receiver<Quaternion>,
    /// The stream, when no worker owns it
    reader: Option<PacketReader<R>>,
    worker: Option<Worker<R>>,
}

impl OrientationEstimator<Box<dyn SerialPort>> {
    /// Open the configured serial port
    pub fn open(config: EstimatorConfig) -> Result<Self> {
        info!(
            "Opening IMU on {} at {} baud",
            config.port_name, config.baud_rate
        );
        let port = serialport::new(config.port_name.as_str(), config.baud_rate)
            .timeout(config.stop_timeout() / 4)
            .open()?;
        port.clear(ClearBuffer::Input)?;
        Ok(Self::new(port, config))
    }
}

impl<R: Read + Send + 'static> OrientationEstimator<R> {
    /// Wrap a byte stream. The estimator starts `Stopped`; call `setup`.
    pub fn new(source: R, config: EstimatorConfig) -> Self {
        let reader = PacketReader::new(source, config.axes, config.reversal);
        let (orientation_tx, orientation_rx) = watch::channel(Quaternion::IDENTITY);
        Self {
            config,
            state: EstimatorState::Stopped,
            calibration: RotationPacket::default(),
            orientation_tx: Arc::new(orientation_tx),
            orientation_rx,
            reader: Some(reader),
            worker: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Current calibration offsets
    pub fn calibration(&self) -> RotationPacket {
        self.calibration
    }

    /// Latest fused orientation. Never blocks.
    pub fn orientation(&self) -> Quaternion {
        *self.orientation_rx.borrow()
    }

    /// A reader handle for other threads or tasks
    pub fn subscribe(&self) -> watch::Receiver<Quaternion> {
        self.orientation_tx.subscribe()
    }

    /// Start the background task
    pub fn setup(&mut self) -> Result<()> {
        if self.state != EstimatorState::Stopped {
            return Err(EstimatorError::InvalidState {
                operation: "set up",
                state: self.state,
            });
        }
        self.spawn_worker()
    }

    /// Stop fusion, sample biases at rest, then resume from identity
    pub fn calibrate(&mut self) -> Result<()> {
        if self.state != EstimatorState::Running {
            return Err(EstimatorError::InvalidState {
                operation: "calibrate",
                state: self.state,
            });
        }
        self.stop()?;

        let samples = self.config.calibration_samples.max(1);
        info!("Calibrating IMU over {} samples, keep the robot still", samples);
        let Some(reader) = self.reader.as_mut() else {
            return Err(EstimatorError::WorkerLost);
        };
        let offsets = match sample_offsets(reader, samples) {
            Ok(offsets) => offsets,
            Err(e) => {
                error!("IMU stream failed during calibration: {}", e);
                self.reader = None;
                self.state = EstimatorState::Failed;
                return Err(e.into());
            }
        };
        self.calibration = offsets;
        info!(
            "IMU calibration: gyro bias {}, accel bias {}",
            offsets.gyro, offsets.accel
        );

        self.orientation_tx.send_replace(Quaternion::IDENTITY);
        self.spawn_worker()
    }

    /// Stop and resume the background task, keeping biases and orientation.
    ///
    /// Also retries a drain that previously timed out.
    pub fn restart(&mut self) -> Result<()> {
        match self.state {
            EstimatorState::Running | EstimatorState::StopRequested => {}
            state => {
                return Err(EstimatorError::InvalidState {
                    operation: "restart",
                    state,
                });
            }
        }
        info!("Restarting IMU background task");
        self.stop()?;
        self.spawn_worker()
    }

    /// Ask the background task to stop and wait for it to hand back the stream
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.as_ref() else {
            return Err(EstimatorError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        };
        worker.stop.store(true, Ordering::Release);
        self.state = EstimatorState::StopRequested;

        let timeout = self.config.stop_timeout();
        match worker.exit_rx.recv_timeout(timeout) {
            Ok(exit) => {
                self.worker = None;
                self.finish_worker(exit)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("IMU background task did not stop within {:?}", timeout);
                Err(EstimatorError::StopTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.worker = None;
                self.state = EstimatorState::Failed;
                Err(EstimatorError::WorkerLost)
            }
        }
    }

    /// Surface a fatal stream error from the background task, if one occurred.
    ///
    /// A stop that timed out may drain later; the stream is then put back to
    /// work so the orientation does not silently freeze.
    pub fn check(&mut self) -> Result<()> {
        let Some(worker) = self.worker.as_ref() else {
            return Ok(());
        };
        match worker.exit_rx.try_recv() {
            Ok(exit) => {
                self.worker = None;
                self.finish_worker(exit)?;
                warn!("IMU background task stopped late, resuming fusion");
                self.spawn_worker()
            }
            Err(mpsc::TryRecvError::Empty) => Ok(()),
            Err(mpsc::TryRecvError::Disconnected) => {
                self.worker = None;
                self.state = EstimatorState::Failed;
                Err(EstimatorError::WorkerLost)
            }
        }
    }

    fn finish_worker(&mut self, exit: WorkerExit<R>) -> Result<()> {
        match exit {
            Ok(reader) => {
                debug!(
                    "IMU background task stopped ({} malformed frames so far)",
                    reader.dropped_frames()
                );
                self.reader = Some(reader);
                self.state = EstimatorState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.state = EstimatorState::Failed;
                Err(e.into())
            }
        }
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            self.state = EstimatorState::Failed;
            return Err(EstimatorError::WorkerLost);
        };
        let stop = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = mpsc::sync_channel(1);
        let fusion = Fusion::new(
            self.orientation(),
            self.calibration,
            self.config.max_correction_rate,
        );

        let handle = {
            let stop = stop.clone();
            let tx = self.orientation_tx.clone();
            thread::Builder::new()
                .name("imu-fusion".to_string())
                .spawn(move || fusion_loop(reader, fusion, tx, stop, exit_tx))?
        };

        self.worker = Some(Worker {
            stop,
            exit_rx,
            _handle: handle,
        });
        self.state = EstimatorState::Running;
        debug!("IMU background task running");
        Ok(())
    }
}

impl<R> Drop for OrientationEstimator<R> {
    fn drop(&mut self) {
        // Do not join: a stalled stream would block the drop forever
        if let Some(worker) = &self.worker {
            worker.stop.store(true, Ordering::Release);
        }
    }
}

/// Mean of `samples` packets with the expected resting up bias removed
fn sample_offsets<R: Read>(reader: &mut PacketReader<R>, samples: usize) -> io::Result<RotationPacket> {
    let mut gyro = Vector3::zero();
    let mut accel = Vector3::zero();
    let mut taken = 0;
    while taken < samples {
        let p = match reader.read_packet() {
            Ok(p) => p,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => return Err(e),
        };
        gyro = gyro + p.gyro;
        // A level sensor at rest reads 0.5 along UP
        accel = accel + p.accel - UP * REST_UP_BIAS;
        taken += 1;
    }
    let n = samples as f64;
    Ok(RotationPacket::new(gyro / n, accel / n))
}

/// Read timeouts just mean no data yet
fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

fn fusion_loop<R: Read>(
    mut reader: PacketReader<R>,
    mut fusion: Fusion,
    orientation_tx: Arc<watch::Sender<Quaternion>>,
    stop: Arc<AtomicBool>,
    exit_tx: SyncSender<WorkerExit<R>>,
) {
    let mut last_update = Instant::now();
    loop {
        if stop.load(Ordering::Acquire) {
            let _ = exit_tx.send(Ok(reader));
            return;
        }

        let packet = match reader.read_packet() {
            Ok(p) => p,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => {
                error!("IMU stream failed: {}", e);
                let _ = exit_tx.send(Err(e));
                return;
            }
        };

        let now = Instant::now();
        let dt = now.duration_since(last_update).as_secs_f64();
        last_update = now;

        let orientation = fusion.step(packet, dt);
        orientation_tx.send_replace(orientation);
    }
}
