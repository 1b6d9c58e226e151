use super::{
    hub::TelemetryHub,
    messages::{BatteryState, ImuRaw, ImuReading, MotorReading, Telemetry},
};
use crate::device::{DeviceError, DeviceGate, FlightController};
use crate::{info, warn};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// A read-only telemetry loop body.
///
/// Sidecars only read from the device and publish; they never touch control state.
#[async_trait]
pub trait Sidecar: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reads one snapshot. Called with the device gate held.
    async fn sample(&self, device: &mut dyn FlightController) -> Result<Vec<Telemetry>, DeviceError>;
}

pub struct BatterySidecar;

#[async_trait]
impl Sidecar for BatterySidecar {
    fn name(&self) -> &'static str { "battery" }

    async fn sample(&self, device: &mut dyn FlightController) -> Result<Vec<Telemetry>, DeviceError> {
        let voltage = device.voltage().await?;
        Ok(vec![Telemetry::Battery(BatteryState::from_voltage(voltage))])
    }
}

pub struct MotorSidecar {
    range: (u16, u16),
}

impl MotorSidecar {
    pub fn new(range: (u16, u16)) -> Self { Self { range } }
}

#[async_trait]
impl Sidecar for MotorSidecar {
    fn name(&self) -> &'static str { "motors" }

    async fn sample(&self, device: &mut dyn FlightController) -> Result<Vec<Telemetry>, DeviceError> {
        let pwm = device.motors_pwm().await?;
        Ok(vec![Telemetry::Motors(MotorReading::new(pwm, self.range))])
    }
}

pub struct ImuSidecar;

#[async_trait]
impl Sidecar for ImuSidecar {
    fn name(&self) -> &'static str { "imu" }

    async fn sample(&self, device: &mut dyn FlightController) -> Result<Vec<Telemetry>, DeviceError> {
        let raw = ImuRaw {
            acceleration: device.acceleration().await?,
            gyro: device.gyro().await?,
            attitude: device.attitude().await?,
        };
        Ok(vec![Telemetry::Imu(ImuReading::floored(&raw)), Telemetry::ImuRaw(raw)])
    }
}

/// Runs one sampling pass: locks the gate, samples, releases, publishes.
pub async fn sample_once(sidecar: &dyn Sidecar, device: &DeviceGate, hub: &TelemetryHub) -> bool {
    let sampled = {
        let mut board = device.lock().await;
        sidecar.sample(&mut **board).await
    };
    match sampled {
        Ok(records) => {
            records.into_iter().for_each(|r| hub.publish(r));
            true
        }
        Err(e) => {
            warn!("Skipping {} telemetry tick: {e}", sidecar.name());
            false
        }
    }
}

/// Fixed-rate loop around [`sample_once`] until `cancel` fires.
pub async fn run_sidecar(
    sidecar: Box<dyn Sidecar>,
    period: Duration,
    device: DeviceGate,
    hub: Arc<TelemetryHub>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                sample_once(sidecar.as_ref(), &device, &hub).await;
            }
        }
    }
    info!("Stopped {} sidecar", sidecar.name());
}
