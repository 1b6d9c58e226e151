use crate::flight_control::{
    HeartbeatSource, Mode, ModeResponse, StickCommand, Supervisor, TriggerResponse,
};
use crate::{info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Inbound messages delivered by the transport layer.
#[derive(Debug)]
pub enum Inbound {
    Heartbeat(HeartbeatSource),
    Stick(StickCommand),
    SetMode { mode: Mode, reply: oneshot::Sender<ModeResponse> },
    ZeroYaw { reply: oneshot::Sender<TriggerResponse> },
    CalibrateImu { reply: oneshot::Sender<TriggerResponse> },
}

/// Sending side handed to the transport layer.
#[derive(Clone)]
pub struct Switchboard {
    tx: mpsc::Sender<Inbound>,
}

impl Switchboard {
    const CAPACITY: usize = 64;

    pub fn new() -> (Self, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (Self { tx }, rx)
    }

    pub async fn heartbeat(&self, source: HeartbeatSource) -> bool {
        self.tx.send(Inbound::Heartbeat(source)).await.is_ok()
    }

    pub async fn stick(&self, command: StickCommand) -> bool {
        self.tx.send(Inbound::Stick(command)).await.is_ok()
    }

    /// Requests a mode change. `None` once the supervisor has stopped listening.
    pub async fn set_mode(&self, mode: Mode) -> Option<ModeResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Inbound::SetMode { mode, reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn zero_yaw(&self) -> Option<TriggerResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Inbound::ZeroYaw { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn calibrate_imu(&self) -> Option<TriggerResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Inbound::CalibrateImu { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// Pumps inbound messages into the supervisor until cancelled or every sender is gone.
///
/// Heartbeats, stick commands and mode requests are handled in arrival order.
/// Trigger services wait on the device gate and therefore run on their own task.
pub async fn run_switchboard(
    mut rx: mpsc::Receiver<Inbound>,
    supervisor: Arc<Supervisor>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            Inbound::Heartbeat(source) => supervisor.touch_heartbeat(source).await,
            Inbound::Stick(command) => {
                supervisor.submit_stick(command).await;
            }
            Inbound::SetMode { mode, reply } => {
                let response = supervisor.request_mode(mode).await;
                if reply.send(response).is_err() {
                    warn!("Mode request for {mode} was abandoned by its caller");
                }
            }
            Inbound::ZeroYaw { reply } => {
                let sv = Arc::clone(&supervisor);
                tokio::spawn(async move {
                    let _ = reply.send(sv.zero_yaw().await);
                });
            }
            Inbound::CalibrateImu { reply } => {
                let sv = Arc::clone(&supervisor);
                tokio::spawn(async move {
                    let _ = reply.send(sv.calibrate_imu().await);
                });
            }
        }
    }
    info!("Switchboard stopped");
}
