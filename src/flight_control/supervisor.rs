use super::{
    command::{CommandComposer, CommandVector, StickCommand},
    drone_mode::Mode,
    heartbeat::{HeartbeatMonitor, HeartbeatSource},
    mode_state::{ModeResponse, ModeState},
};
use crate::config::SupervisorConfig;
use crate::device::DeviceGate;
use crate::telemetry::{Telemetry, TelemetryHub};
use crate::{error, event, info, log, warn};
use chrono::Utc;
use std::sync::Arc;
use tokio::{sync::RwLock, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Reply of the administrative trigger services.
#[derive(Debug, PartialEq, Eq, Clone, serde::Serialize, serde::Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
}

impl TriggerResponse {
    fn ok(message: impl Into<String>) -> Self { Self { success: true, message: message.into() } }

    fn failed(message: impl Into<String>) -> Self { Self { success: false, message: message.into() } }
}

/// What a single control tick did.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TickOutcome {
    /// The command was composed and accepted by the device.
    Dispatched(CommandVector),
    /// A stale heartbeat forced a disarm, nothing was dispatched.
    Failsafe,
    /// The device rejected the dispatch, the tick was skipped.
    DeviceError,
    /// The supervisor is shutting down.
    Halted,
}

/// Control state mutated by the tick and by inbound requests.
#[derive(Debug)]
struct ControlState {
    modes: ModeState,
    /// Latest stick input, only kept while `Flying` is requested.
    stick: Option<StickCommand>,
    command: CommandVector,
    shutting_down: bool,
}

/// Safety and command-dispatch supervisor.
///
/// Owns the arming state machine and the heartbeat set, and runs the fixed-rate
/// control loop that composes the RC command and dispatches it through the device
/// gate. Shared as `Arc<Supervisor>` between the loop and the inbound switchboard.
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    control: RwLock<ControlState>,
    heartbeats: RwLock<HeartbeatMonitor>,
    device: DeviceGate,
    hub: Arc<TelemetryHub>,
}

impl Supervisor {
    const NO_IMU_DATA: &'static str = "No IMU data received yet";

    pub fn new(config: Arc<SupervisorConfig>, device: DeviceGate, hub: Arc<TelemetryHub>) -> Self {
        let control = ControlState {
            modes: ModeState::new(),
            stick: None,
            command: CommandComposer::new(&config.rc_commands, config.command_range).disarm(),
            shutting_down: false,
        };
        Self {
            config,
            control: RwLock::new(control),
            heartbeats: RwLock::new(HeartbeatMonitor::new(Utc::now())),
            device,
            hub,
        }
    }

    fn composer(&self) -> CommandComposer<'_> {
        CommandComposer::new(&self.config.rc_commands, self.config.command_range)
    }

    pub fn hub(&self) -> Arc<TelemetryHub> { Arc::clone(&self.hub) }

    pub fn device(&self) -> DeviceGate { Arc::clone(&self.device) }

    pub async fn touch_heartbeat(&self, source: HeartbeatSource) {
        self.heartbeats.write().await.touch(source);
    }

    /// Enabled heartbeat sources that are currently stale.
    pub async fn stale_sources(&self) -> Vec<HeartbeatSource> {
        let enabled = self.config.heartbeats;
        let threshold = self.config.heartbeat_threshold();
        self.heartbeats.read().await.stale_sources(Utc::now(), threshold, |s| enabled.is_enabled(s))
    }

    /// `(current, requested)` as seen right now.
    pub async fn modes(&self) -> ModeResponse { self.control.read().await.modes.response() }

    /// The command composed by the most recent tick.
    pub async fn last_command(&self) -> CommandVector { self.control.read().await.command }

    /// Handles an external mode-change request.
    ///
    /// `Armed` and `Flying` are turned into `Disarmed` while any enabled heartbeat
    /// is stale, and every request becomes `Disarmed` once shutdown has started.
    /// The response reflects the state after those overrides.
    pub async fn request_mode(&self, mode: Mode) -> ModeResponse {
        let stale = self.stale_sources().await;
        let (response, unpublished) = {
            let mut control = self.control.write().await;
            let effective = if control.shutting_down { Mode::Disarmed } else { mode };
            let response = control.modes.request(effective, !stale.is_empty());
            if effective.is_requestable() {
                control.stick = None;
            }
            (response, control.modes.take_unpublished())
        };
        if mode.is_active() && response.current_mode == Mode::Disarmed {
            warn!("Request for {mode} overridden, staying DISARMED");
        }
        if let Some(published) = unpublished {
            self.hub.publish(Telemetry::Mode(published));
        }
        if mode.is_requestable() {
            log!("Mode request {mode}: {} -> {}", response.previous_mode, response.current_mode);
        }
        response
    }

    /// Stores a stick command. Only accepted while `Flying` is requested.
    pub async fn submit_stick(&self, stick: StickCommand) -> bool {
        let mut control = self.control.write().await;
        if control.shutting_down || control.modes.requested() != Mode::Flying {
            event!("Dropping stick command while {}", control.modes.requested());
            return false;
        }
        control.stick = Some(stick);
        true
    }

    /// One iteration of the control loop.
    pub(crate) async fn tick(&self) -> TickOutcome {
        let stale = self.stale_sources().await;
        let (command, unpublished) = {
            let mut control = self.control.write().await;
            if control.shutting_down {
                return TickOutcome::Halted;
            }
            if control.modes.requested() != Mode::Disarmed && !stale.is_empty() {
                for source in &stale {
                    error!("Safety Failure: {}", source.failure_rationale());
                }
                control.modes.apply_transition(Mode::Disarmed);
                control.stick = None;
                return TickOutcome::Failsafe;
            }
            let composer = self.composer();
            let ControlState { modes, stick, command, .. } = &mut *control;
            *command = composer.compose(modes, stick.as_ref());
            (*command, modes.take_unpublished())
        };

        let sent = self.device.lock().await.send_command(command).await;
        if let Some(published) = unpublished {
            self.hub.publish(Telemetry::Mode(published));
        }
        match sent {
            Ok(()) => {
                self.hub.publish(Telemetry::Command(command));
                TickOutcome::Dispatched(command)
            }
            Err(e) => {
                warn!("Could not talk to the flight controller: {e}");
                TickOutcome::DeviceError
            }
        }
    }

    /// Runs the control loop at the configured command frequency until `cancel`
    /// fires, then performs the shutdown sequence.
    pub async fn run(&self, cancel: CancellationToken) {
        let hz = self.config.frequency.commands;
        let mut ticker = tokio::time::interval(SupervisorConfig::period(hz));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Control loop running at {hz} Hz");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        self.shutdown().await;
    }

    /// Forces `Disarmed`, flushes the disarm preset through the device gate,
    /// publishes the mode and releases the device after the grace period.
    ///
    /// The gate stays locked from the final disarm until the handle is closed, so
    /// nothing else reaches the board in between.
    pub async fn shutdown(&self) {
        info!("Shutdown received, disarming...");
        let disarm = {
            let mut control = self.control.write().await;
            if control.shutting_down {
                return;
            }
            control.shutting_down = true;
            control.stick = None;
            control.modes.apply_transition(Mode::Disarmed);
            control.modes.take_unpublished();
            control.command = self.composer().disarm();
            control.command
        };
        let mut device = self.device.lock().await;
        match device.send_command(disarm).await {
            Ok(()) => self.hub.publish(Telemetry::Command(disarm)),
            Err(e) => error!("Final disarm failed: {e}"),
        }
        self.hub.publish(Telemetry::Mode(Mode::Disarmed));
        tokio::time::sleep(self.config.shutdown_grace()).await;
        device.close().await;
        info!("Flight controller released");
    }

    /// Adds the latest published yaw to the device's yaw offset.
    pub async fn zero_yaw(&self) -> TriggerResponse {
        let Some(attitude) = self.hub.latest_attitude() else {
            return TriggerResponse::failed(Self::NO_IMU_DATA);
        };
        let mut device = self.device.lock().await;
        let offset = device.yaw_offset() + attitude.yaw;
        device.set_yaw_offset(offset);
        info!("Yaw zeroed to {offset}");
        TriggerResponse::ok(format!("Yaw zeroed to {offset}"))
    }

    pub async fn calibrate_imu(&self) -> TriggerResponse {
        info!("Calibrating IMU...");
        match self.device.lock().await.calibrate_imu().await {
            Ok(()) => TriggerResponse::ok("IMU calibrated"),
            Err(e) => {
                error!("IMU calibration failed: {e}");
                TriggerResponse::failed(e.to_string())
            }
        }
    }
}
