use crate::config::SupervisorConfig;
use crate::device::{self, DeviceGate, StartupError, VirtualBoardProbe};
use crate::flight_control::Supervisor;
use crate::telemetry::TelemetryHub;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Struct bundling the shared handles of the application, built once at startup.
///
/// # Fields
/// - `config`: The validated supervisor configuration.
/// - `device`: The exclusive access gate to the flight controller.
/// - `hub`: The telemetry hub every component publishes to.
/// - `supervisor`: The control supervisor owning the arming state.
/// - `cancel`: The token every long-running task listens on for shutdown.
#[derive(Clone)]
pub struct Keychain {
    config: Arc<SupervisorConfig>,
    device: DeviceGate,
    hub: Arc<TelemetryHub>,
    supervisor: Arc<Supervisor>,
    cancel: CancellationToken,
}

impl Keychain {
    /// Validates `config`, opens the device backend and wires up all components.
    ///
    /// # Returns
    /// The keychain and, for the virtual backend, the board probe.
    ///
    /// # Errors
    /// A [`StartupError`] if the configuration is unusable or the device cannot be opened.
    pub fn new(config: SupervisorConfig) -> Result<(Self, Option<VirtualBoardProbe>), StartupError> {
        config.validate()?;
        let config = Arc::new(config);
        let (device, probe) = device::open_backend(&config)?;
        let hub = Arc::new(TelemetryHub::new());
        let supervisor =
            Arc::new(Supervisor::new(Arc::clone(&config), Arc::clone(&device), Arc::clone(&hub)));
        let keychain = Self { config, device, hub, supervisor, cancel: CancellationToken::new() };
        Ok((keychain, probe))
    }

    pub fn config(&self) -> Arc<SupervisorConfig> { Arc::clone(&self.config) }

    pub fn device(&self) -> DeviceGate { Arc::clone(&self.device) }

    pub fn hub(&self) -> Arc<TelemetryHub> { Arc::clone(&self.hub) }

    pub fn supervisor(&self) -> Arc<Supervisor> { Arc::clone(&self.supervisor) }

    pub fn cancel(&self) -> CancellationToken { self.cancel.clone() }
}
