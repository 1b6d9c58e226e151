use super::flight_controller::{
    ACC_RAW_TO_MSS, Attitude, DeviceError, FlightController, GYRO_RAW_TO_DEG_S, MotorPwm, Vec3,
};
use crate::flight_control::{CommandVector, ModePresets};
use crate::{event, info};
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
};
use tokio::sync::Mutex;

/// State shared between a [`VirtualBoard`] and its [`VirtualBoardProbe`].
#[derive(Debug)]
struct BoardState {
    link_up: AtomicBool,
    closed: AtomicBool,
    armed: AtomicBool,
    throttle: AtomicI32,
    /// Battery voltage as `f64` bits.
    voltage: AtomicU64,
    /// Heading in tenths of a degree, clockwise like the real board.
    heading_decideg: AtomicI32,
    calibrations: AtomicUsize,
    /// The last [`VirtualBoard::SENT_LOG_LEN`] accepted commands.
    sent: Mutex<VecDeque<CommandVector>>,
}

/// In-process simulated flight controller board.
///
/// Arming follows the received presets: the arm preset arms the board, the disarm
/// preset disarms it. While armed the motors spin at the commanded throttle.
pub struct VirtualBoard {
    presets: ModePresets,
    motor_range: (u16, u16),
    yaw_offset: f64,
    state: Arc<BoardState>,
}

impl VirtualBoard {
    const DEFAULT_VOLTAGE: f64 = 11.1;
    /// Raw accelerometer reading of 1g.
    const ONE_G_RAW: i16 = 512;
    const NOISE_RAW: i16 = 3;
    pub const SENT_LOG_LEN: usize = 256;

    pub fn new(presets: ModePresets, motor_range: (u16, u16)) -> (Self, VirtualBoardProbe) {
        let state = Arc::new(BoardState {
            link_up: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            throttle: AtomicI32::new(presets.disarm.throttle()),
            voltage: AtomicU64::new(Self::DEFAULT_VOLTAGE.to_bits()),
            heading_decideg: AtomicI32::new(0),
            calibrations: AtomicUsize::new(0),
            sent: Mutex::new(VecDeque::with_capacity(Self::SENT_LOG_LEN)),
        });
        let probe = VirtualBoardProbe { state: Arc::clone(&state) };
        (Self { presets, motor_range, yaw_offset: 0.0, state }, probe)
    }

    fn check_link(&self) -> Result<(), DeviceError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(DeviceError::Closed);
        }
        if !self.state.link_up.load(Ordering::Acquire) {
            return Err(DeviceError::Communication("virtual link down".to_string()));
        }
        Ok(())
    }

    fn noisy(base: i16) -> f64 {
        let noise = rand::rng().random_range(-Self::NOISE_RAW..=Self::NOISE_RAW);
        f64::from(base.saturating_add(noise))
    }

    fn motor_value(&self) -> u16 {
        let (min, max) = self.motor_range;
        if !self.state.armed.load(Ordering::Acquire) {
            return min;
        }
        let throttle = self.state.throttle.load(Ordering::Acquire);
        let bounded = throttle.clamp(i32::from(min), i32::from(max));
        u16::try_from(bounded).unwrap_or(min)
    }
}

#[async_trait]
impl FlightController for VirtualBoard {
    fn type_name(&self) -> &'static str { "VirtualBoard" }

    fn presets(&self) -> &ModePresets { &self.presets }

    async fn send_command(&mut self, command: CommandVector) -> Result<(), DeviceError> {
        self.check_link()?;
        if command == self.presets.arm && !self.state.armed.swap(true, Ordering::AcqRel) {
            event!("Virtual board armed");
        } else if command == self.presets.disarm && self.state.armed.swap(false, Ordering::AcqRel) {
            event!("Virtual board disarmed");
        }
        self.state.throttle.store(command.throttle(), Ordering::Release);
        let mut sent = self.state.sent.lock().await;
        if sent.len() == Self::SENT_LOG_LEN {
            sent.pop_front();
        }
        sent.push_back(command);
        Ok(())
    }

    async fn acceleration(&mut self) -> Result<Vec3, DeviceError> {
        self.check_link()?;
        let raw = Vec3::new(Self::noisy(0), Self::noisy(0), Self::noisy(Self::ONE_G_RAW));
        Ok(raw.map(|v| v * ACC_RAW_TO_MSS))
    }

    async fn gyro(&mut self) -> Result<Vec3, DeviceError> {
        self.check_link()?;
        let raw = Vec3::new(Self::noisy(0), Self::noisy(0), Self::noisy(0));
        Ok(raw.map(|v| v * GYRO_RAW_TO_DEG_S))
    }

    async fn attitude(&mut self) -> Result<Attitude, DeviceError> {
        self.check_link()?;
        let heading = f64::from(self.state.heading_decideg.load(Ordering::Acquire)) / 10.0;
        Ok(Attitude::from_board_degrees(0.0, 0.0, heading, self.yaw_offset))
    }

    async fn voltage(&mut self) -> Result<f64, DeviceError> {
        self.check_link()?;
        Ok(f64::from_bits(self.state.voltage.load(Ordering::Acquire)))
    }

    async fn motors_pwm(&mut self) -> Result<MotorPwm, DeviceError> {
        self.check_link()?;
        let m = self.motor_value();
        Ok(MotorPwm { m1: m, m2: m, m3: m, m4: m })
    }

    async fn calibrate_imu(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.state.calibrations.fetch_add(1, Ordering::AcqRel);
        info!("Virtual board IMU calibrated");
        Ok(())
    }

    fn yaw_offset(&self) -> f64 { self.yaw_offset }

    fn set_yaw_offset(&mut self, offset: f64) { self.yaw_offset = offset; }

    async fn close(&mut self) {
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            info!("Virtual board released");
        }
    }
}

/// Inspection and fault-injection handle of a [`VirtualBoard`].
#[derive(Debug, Clone)]
pub struct VirtualBoardProbe {
    state: Arc<BoardState>,
}

impl VirtualBoardProbe {
    /// The most recently accepted commands, oldest first.
    pub async fn sent(&self) -> Vec<CommandVector> {
        self.state.sent.lock().await.iter().copied().collect()
    }

    pub async fn last_sent(&self) -> Option<CommandVector> {
        self.state.sent.lock().await.back().copied()
    }

    pub async fn clear_sent(&self) { self.state.sent.lock().await.clear(); }

    /// Simulates an unplugged (`false`) or reconnected (`true`) board.
    pub fn set_link(&self, up: bool) { self.state.link_up.store(up, Ordering::Release); }

    pub fn set_voltage(&self, volts: f64) {
        self.state.voltage.store(volts.to_bits(), Ordering::Release);
    }

    pub fn set_heading_decideg(&self, heading: i32) {
        self.state.heading_decideg.store(heading, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool { self.state.armed.load(Ordering::Acquire) }

    pub fn is_closed(&self) -> bool { self.state.closed.load(Ordering::Acquire) }

    pub fn calibrations(&self) -> usize { self.state.calibrations.load(Ordering::Acquire) }
}
