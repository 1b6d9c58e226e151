use super::messages::Telemetry;
use crate::device::Attitude;
use crate::event;
use crate::flight_control::Mode;
use tokio::sync::{broadcast, watch};

/// Outbound publication point.
///
/// Every record is fanned out on a broadcast channel. The mode and the most recent
/// attitude are additionally latched so late subscribers and the zero-yaw service
/// see the last value.
pub struct TelemetryHub {
    stream: broadcast::Sender<Telemetry>,
    mode: watch::Sender<Option<Mode>>,
    attitude: watch::Sender<Option<Attitude>>,
}

impl TelemetryHub {
    const STREAM_CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(Self::STREAM_CAPACITY);
        let (mode, _) = watch::channel(None);
        let (attitude, _) = watch::channel(None);
        Self { stream, mode, attitude }
    }

    pub fn publish(&self, record: Telemetry) {
        match record {
            Telemetry::Mode(m) => {
                self.mode.send_replace(Some(m));
            }
            Telemetry::Imu(imu) => {
                self.attitude.send_replace(Some(imu.attitude));
            }
            _ => {}
        }
        if self.stream.send(record).is_err() {
            event!("No telemetry subscribers for {record:?}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Telemetry> { self.stream.subscribe() }

    pub fn watch_mode(&self) -> watch::Receiver<Option<Mode>> { self.mode.subscribe() }

    pub fn latest_mode(&self) -> Option<Mode> { *self.mode.borrow() }

    pub fn latest_attitude(&self) -> Option<Attitude> { *self.attitude.borrow() }
}

impl Default for TelemetryHub {
    fn default() -> Self { Self::new() }
}
