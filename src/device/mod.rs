mod flight_controller;
pub(crate) mod msp;
mod physical;
mod virtual_board;
#[cfg(test)]
mod tests;

pub use flight_controller::{
    ACC_RAW_TO_MSS, Attitude, DeviceError, FlightController, GYRO_RAW_TO_DEG_S, MotorPwm, Vec3,
};
pub use physical::PhysicalBoard;
pub use virtual_board::{VirtualBoard, VirtualBoardProbe};

use crate::config::{DeviceBackend, SupervisorConfig};
use crate::info;
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::Mutex;

/// The single exclusive access path to the flight controller.
pub type DeviceGate = Arc<Mutex<Box<dyn FlightController>>>;

/// Errors that prevent the supervisor from starting.
#[derive(Debug)]
pub enum StartupError {
    DeviceUnavailable { port: PathBuf, reason: String },
    InvalidConfig(String),
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::DeviceUnavailable { port, reason } => {
                write!(f, "cannot open flight controller at {}: {reason}", port.display())
            }
            StartupError::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Opens the configured backend and wraps it in a [`DeviceGate`].
///
/// The virtual backend additionally hands out its probe. Must be called inside
/// the runtime, the physical backend registers its port with the reactor.
pub fn open_backend(
    config: &SupervisorConfig,
) -> Result<(DeviceGate, Option<VirtualBoardProbe>), StartupError> {
    let presets = config.rc_commands.clone();
    let (board, probe) = match &config.device {
        DeviceBackend::Virtual => {
            let (board, probe) = VirtualBoard::new(presets, config.motor_command_range);
            (Box::new(board) as Box<dyn FlightController>, Some(probe))
        }
        DeviceBackend::Physical { port } => {
            let board = PhysicalBoard::open(presets, port)?;
            (Box::new(board) as Box<dyn FlightController>, None)
        }
    };
    info!("Flight controller backend: {}", board.type_name());
    Ok((Arc::new(Mutex::new(board)), probe))
}
