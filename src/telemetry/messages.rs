use crate::device::{Attitude, MotorPwm, Vec3};
use crate::flight_control::{CommandVector, Mode};

/// Readings with a smaller magnitude are published as exact zero.
pub const FLOOR_EPSILON: f64 = 1e-4;
/// Below this voltage the board is powered from the companion computer.
pub const BATTERY_PRESENT_VOLTAGE: f64 = 6.0;

pub fn near_zero(value: f64) -> f64 { if value.abs() < FLOOR_EPSILON { 0.0 } else { value } }

#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BatteryState {
    pub voltage: f64,
    pub present: bool,
}

impl BatteryState {
    pub fn from_voltage(voltage: f64) -> Self {
        Self { voltage: near_zero(voltage), present: voltage > BATTERY_PRESENT_VOLTAGE }
    }
}

/// Motor PWM readback together with the configured command range.
#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MotorReading {
    pub m1: u16,
    pub m2: u16,
    pub m3: u16,
    pub m4: u16,
    pub minimum: u16,
    pub maximum: u16,
}

impl MotorReading {
    pub fn new(pwm: MotorPwm, (minimum, maximum): (u16, u16)) -> Self {
        Self { m1: pwm.m1, m2: pwm.m2, m3: pwm.m3, m4: pwm.m4, minimum, maximum }
    }
}

/// Floored IMU record: acceleration in m/s², angular velocity in deg/s, attitude in rad.
#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ImuReading {
    pub linear_acceleration: Vec3,
    pub angular_velocity: Vec3,
    pub attitude: Attitude,
}

impl ImuReading {
    pub fn floored(raw: &ImuRaw) -> Self {
        Self {
            linear_acceleration: raw.acceleration.map(near_zero),
            angular_velocity: raw.gyro.map(near_zero),
            attitude: raw.attitude.map(near_zero),
        }
    }
}

/// The same three vectors as [`ImuReading`], unfloored.
#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ImuRaw {
    pub acceleration: Vec3,
    pub gyro: Vec3,
    pub attitude: Attitude,
}

/// Everything the supervisor and its sidecars publish.
#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum Telemetry {
    Mode(Mode),
    Command(CommandVector),
    Battery(BatteryState),
    Motors(MotorReading),
    Imu(ImuReading),
    ImuRaw(ImuRaw),
}
