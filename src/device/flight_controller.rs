use crate::flight_control::{CommandVector, Mode, ModePresets};
use async_trait::async_trait;
use std::fmt::{Display, Formatter};

/// Accelerometer scaling from raw LSB (1g = 512) to m/s².
pub const ACC_RAW_TO_MSS: f64 = 9.81 / 512.0;
/// Gyro scaling from raw LSB to deg/s.
pub const GYRO_RAW_TO_DEG_S: f64 = 1.0 / 16.4;

/// Errors surfaced by a flight controller backend.
#[derive(Debug)]
pub enum DeviceError {
    /// The link to the board failed (I/O error, unplugged device, ...).
    Communication(String),
    /// The board did not answer a request within the response window.
    Timeout { cmd: u8 },
    /// The board answered, but the reply was malformed or an error frame.
    Protocol { cmd: u8, reason: &'static str },
    /// The device handle has already been released.
    Closed,
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Communication(reason) => write!(f, "communication error: {reason}"),
            DeviceError::Timeout { cmd } => write!(f, "no response to command {cmd}"),
            DeviceError::Protocol { cmd, reason } => write!(f, "protocol error on command {cmd}: {reason}"),
            DeviceError::Closed => write!(f, "device handle already released"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(value: std::io::Error) -> Self { DeviceError::Communication(value.to_string()) }
}

/// A three-axis sensor reading.
#[derive(Debug, PartialEq, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self { Self::new(f(self.x), f(self.y), f(self.z)) }
}

/// Board attitude in radians. Yaw is counter-clockwise positive in `[0, 2π)`
/// before the yaw offset is subtracted.
#[derive(Debug, PartialEq, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    /// Converts the board's degree angles and applies the heading convention.
    pub fn from_board_degrees(roll: f64, pitch: f64, heading: f64, yaw_offset: f64) -> Self {
        let yaw = (-heading.to_radians()).rem_euclid(std::f64::consts::TAU) - yaw_offset;
        Self { roll: roll.to_radians(), pitch: pitch.to_radians(), yaw }
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self { roll: f(self.roll), pitch: f(self.pitch), yaw: f(self.yaw) }
    }
}

/// PWM duty cycle of the four motors as reported by the board.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct MotorPwm {
    pub m1: u16,
    pub m2: u16,
    pub m3: u16,
    pub m4: u16,
}

/// Capability interface of a flight controller board.
///
/// Implementations are not required to be safe for concurrent use; callers go
/// through a single [`super::DeviceGate`].
#[async_trait]
pub trait FlightController: Send {
    fn type_name(&self) -> &'static str;

    fn presets(&self) -> &ModePresets;

    fn preset_for(&self, mode: Mode) -> Option<CommandVector> { self.presets().preset_for(mode) }

    async fn send_command(&mut self, command: CommandVector) -> Result<(), DeviceError>;

    /// Sends the board's own disarm preset, unclamped.
    async fn disarm(&mut self) -> Result<(), DeviceError> {
        let disarm = self.presets().disarm;
        self.send_command(disarm).await
    }

    async fn acceleration(&mut self) -> Result<Vec3, DeviceError>;

    async fn gyro(&mut self) -> Result<Vec3, DeviceError>;

    async fn attitude(&mut self) -> Result<Attitude, DeviceError>;

    async fn voltage(&mut self) -> Result<f64, DeviceError>;

    async fn motors_pwm(&mut self) -> Result<MotorPwm, DeviceError>;

    async fn calibrate_imu(&mut self) -> Result<(), DeviceError>;

    fn yaw_offset(&self) -> f64;

    fn set_yaw_offset(&mut self, offset: f64);

    /// Releases the underlying handle. Every later call fails with [`DeviceError::Closed`].
    async fn close(&mut self);
}
