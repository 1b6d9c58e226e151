mod hub;
mod messages;
mod sidecar;
#[cfg(test)]
mod tests;

pub use hub::TelemetryHub;
pub use messages::{
    BATTERY_PRESENT_VOLTAGE, BatteryState, FLOOR_EPSILON, ImuRaw, ImuReading, MotorReading, Telemetry,
    near_zero,
};
pub use sidecar::{BatterySidecar, ImuSidecar, MotorSidecar, Sidecar, run_sidecar, sample_once};
