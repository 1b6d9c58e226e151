#![allow(dead_code)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod config;
mod device;
mod flight_control;
mod switchboard;
mod telemetry;
mod util;

use crate::config::SupervisorConfig;
use crate::switchboard::{Inbound, Switchboard, run_switchboard};
use crate::telemetry::{BatterySidecar, ImuSidecar, MotorSidecar, Sidecar, run_sidecar};
use crate::util::Keychain;
use futures::future::join_all;
use tokio::{sync::mpsc::Receiver, task::JoinHandle};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = SupervisorConfig::from_env();
    let (keychain, probe) =
        Keychain::new(config).unwrap_or_else(|e| fatal!("Supervisor cannot start: {e}"));
    if probe.is_some() {
        warn!("Running against the virtual flight controller");
    }
    let (switchboard, inbound) = Switchboard::new();
    let tasks = spawn_tasks(&keychain, inbound);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, stopping"),
        Err(e) => error!("Cannot listen for the interrupt signal, stopping: {e}"),
    }
    keychain.cancel().cancel();
    // Closes the inbound channel.
    drop(switchboard);
    for res in join_all(tasks).await {
        if let Err(e) = res {
            error!("Task ended abnormally: {e}");
        }
    }
    info!("Supervisor stopped");
}

/// Spawns the control loop, the telemetry sidecars and the inbound switchboard.
fn spawn_tasks(keychain: &Keychain, inbound: Receiver<Inbound>) -> Vec<JoinHandle<()>> {
    let config = keychain.config();
    let freq = config.frequency;
    let sidecars: [(Box<dyn Sidecar>, f64); 3] = [
        (Box::new(BatterySidecar), freq.battery),
        (Box::new(MotorSidecar::new(config.motor_command_range)), freq.motors),
        (Box::new(ImuSidecar), freq.imu),
    ];

    let mut tasks = Vec::with_capacity(sidecars.len() + 2);
    let supervisor = keychain.supervisor();
    let cancel = keychain.cancel();
    tasks.push(tokio::spawn(async move { supervisor.run(cancel).await }));
    for (sidecar, hz) in sidecars {
        info!("Starting {} sidecar at {hz} Hz", sidecar.name());
        tasks.push(tokio::spawn(run_sidecar(
            sidecar,
            SupervisorConfig::period(hz),
            keychain.device(),
            keychain.hub(),
            keychain.cancel(),
        )));
    }
    tasks.push(tokio::spawn(run_switchboard(inbound, keychain.supervisor(), keychain.cancel())));
    tasks
}
