// Raw motion packet framing
//
// Wire format: ASCII JSON arrays `[gx,gy,gz,ax,ay,az]`. A frame starts at '['
// and ends at the next ']'. Bytes outside a frame are noise. A frame that
// does not decode to exactly six numbers is dropped and scanning resumes.

use std::io::{self, BufReader, Read};
use std::ops::Sub;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::math::{AxesRemapper, Vector3};

/// Frame delimiters
pub const FRAME_START: u8 = b'[';
pub const FRAME_END: u8 = b']';

/// Number of values in a frame
pub const FRAME_VALUES: usize = 6;

/// Longest frame accepted before it is treated as garbage
pub const MAX_FRAME_LEN: usize = 256;

/// One gyro + accelerometer reading in canonical axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationPacket {
    /// Angular rate (deg/s)
    pub gyro: Vector3,
    /// Acceleration (g)
    pub accel: Vector3,
}

impl RotationPacket {
    pub fn new(gyro: Vector3, accel: Vector3) -> Self {
        Self { gyro, accel }
    }
}

impl Sub for RotationPacket {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.gyro - rhs.gyro, self.accel - rhs.accel)
    }
}

/// Sign reversals applied to the gyro after axis remapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroReversal {
    #[serde(rename = "rev_gyro_forward", default)]
    pub forward: bool,
    #[serde(rename = "rev_gyro_up", default)]
    pub up: bool,
    #[serde(rename = "rev_gyro_left", default)]
    pub left: bool,
}

impl GyroReversal {
    /// Flip the canonical x (forward), y (up/down) and z (left) components
    pub fn apply(&self, mut gyro: Vector3) -> Vector3 {
        if self.forward {
            gyro.x = -gyro.x;
        }
        if self.up {
            gyro.y = -gyro.y;
        }
        if self.left {
            gyro.z = -gyro.z;
        }
        gyro
    }
}

/// Incremental bracket-delimited frame scanner
#[derive(Debug, Default)]
pub struct FrameScanner {
    frame: Vec<u8>,
    in_frame: bool,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a complete frame (brackets included) when one ends
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if !self.in_frame {
            if byte == FRAME_START {
                self.in_frame = true;
                self.frame.clear();
                self.frame.push(byte);
            }
            return None;
        }

        self.frame.push(byte);
        if byte == FRAME_END {
            self.in_frame = false;
            return Some(std::mem::take(&mut self.frame));
        }

        if self.frame.len() > MAX_FRAME_LEN {
            trace!("Dropping oversized frame ({} bytes)", self.frame.len());
            self.in_frame = false;
            self.frame.clear();
        }
        None
    }
}

/// Decode a frame into its six values, or `None` if it is malformed
pub fn decode_frame(frame: &[u8]) -> Option<[f64; FRAME_VALUES]> {
    let values: Vec<f64> = serde_json::from_slice(frame).ok()?;
    values.try_into().ok()
}

/// Reads rotation packets from a blocking byte stream.
///
/// Scanner state survives read errors, so a timed-out read can be retried
/// without losing a partially received frame.
pub struct PacketReader<R> {
    source: BufReader<R>,
    scanner: FrameScanner,
    axes: AxesRemapper,
    reversal: GyroReversal,
    dropped_frames: u64,
}

impl<R: Read> PacketReader<R> {
    pub fn new(source: R, axes: AxesRemapper, reversal: GyroReversal) -> Self {
        Self {
            source: BufReader::new(source),
            scanner: FrameScanner::new(),
            axes,
            reversal,
            dropped_frames: 0,
        }
    }

    /// Frames discarded so far because they failed to decode
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.source.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Block until the next valid packet, remapped into canonical axes.
    ///
    /// Malformed frames are skipped. Any I/O error is returned as is;
    /// end of stream surfaces as `UnexpectedEof`.
    pub fn read_packet(&mut self) -> io::Result<RotationPacket> {
        loop {
            let byte = self.read_byte()?;
            let Some(frame) = self.scanner.push(byte) else {
                continue;
            };
            match decode_frame(&frame) {
                Some(values) => return Ok(self.to_canonical(values)),
                None => {
                    self.dropped_frames += 1;
                    trace!(
                        "Dropping malformed frame: {}",
                        String::from_utf8_lossy(&frame)
                    );
                }
            }
        }
    }

    fn to_canonical(&self, v: [f64; FRAME_VALUES]) -> RotationPacket {
        let gyro = self.axes.remap(Vector3::new(v[0], v[1], v[2]));
        let accel = self.axes.remap(Vector3::new(v[3], v[4], v[5]));
        RotationPacket::new(self.reversal.apply(gyro), accel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{FORWARD, LEFT, UP};
    use std::io::Cursor;

    fn reader(data: &str) -> PacketReader<Cursor<Vec<u8>>> {
        PacketReader::new(
            Cursor::new(data.as_bytes().to_vec()),
            AxesRemapper::default(),
            GyroReversal::default(),
        )
    }

    #[test]
    fn test_decode_frame() {
        assert_eq!(
            decode_frame(b"[1,2,3,4.5,-5,6e-1]"),
            Some([1.0, 2.0, 3.0, 4.5, -5.0, 0.6])
        );
        assert_eq!(decode_frame(b"[1,2,3,4,5]"), None);
        assert_eq!(decode_frame(b"[1,2,3,4,5,6,7]"), None);
        assert_eq!(decode_frame(b"[1,2,x,4,5,6]"), None);
    }

    #[test]
    fn test_skips_noise_and_bad_frames() {
        let mut r = reader("garbage]][1,2][1,2,3,4,5,oops]xx[0.5,0,0,0,-1,0]tail");
        let p = r.read_packet().unwrap();
        assert_eq!(p.gyro, Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(p.accel, Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(r.dropped_frames(), 2);
    }

    #[test]
    fn test_consecutive_packets() {
        let mut r = reader("[1,0,0,0,0,0]\r\n[2,0,0,0,0,0]\r\n");
        assert_eq!(r.read_packet().unwrap().gyro.x, 1.0);
        assert_eq!(r.read_packet().unwrap().gyro.x, 2.0);
    }

    #[test]
    fn test_eof_is_an_error() {
        let mut r = reader("[1,2,3");
        let err = r.read_packet().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut data = String::from("[");
        data.push_str(&"1".repeat(MAX_FRAME_LEN + 10));
        data.push_str("][1,1,1,2,2,2]");
        let mut r = reader(&data);
        let p = r.read_packet().unwrap();
        assert_eq!(p.gyro, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_remap_and_reversal() {
        // Sensor frame: y is left, z is up
        let axes = AxesRemapper::new(FORWARD, LEFT, UP);
        let reversal = GyroReversal {
            forward: true,
            up: false,
            left: false,
        };
        let mut r = PacketReader::new(
            Cursor::new(b"[1,0,2,0,0,1]".to_vec()),
            axes,
            reversal,
        );
        let p = r.read_packet().unwrap();
        // gyro x reversed; sensor z (up) lands on canonical UP
        assert!(p.gyro.approx_eq(Vector3::new(-1.0, -2.0, 0.0), 1e-12));
        assert!(p.accel.approx_eq(UP, 1e-12));
    }
}
