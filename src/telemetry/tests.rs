use super::{
    BatterySidecar, BatteryState, ImuSidecar, MotorSidecar, Telemetry, TelemetryHub, near_zero,
    run_sidecar, sample_once,
};
use crate::config::SupervisorConfig;
use crate::device::{DeviceGate, FlightController, VirtualBoard, VirtualBoardProbe};
use crate::flight_control::Mode;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn gate() -> (DeviceGate, VirtualBoardProbe) {
    let config = SupervisorConfig::default();
    let (board, probe) = VirtualBoard::new(config.rc_commands, config.motor_command_range);
    let board: Box<dyn FlightController> = Box::new(board);
    (Arc::new(Mutex::new(board)), probe)
}

#[test]
fn test_small_value_flooring() {
    assert!(near_zero(0.00005).abs() < f64::EPSILON);
    assert!((near_zero(0.0002) - 0.0002).abs() < f64::EPSILON);
    assert!((near_zero(-0.00009)).abs() < f64::EPSILON);
    assert!((near_zero(-3.5) + 3.5).abs() < f64::EPSILON);
}

#[test]
fn test_battery_presence() {
    assert!(BatteryState::from_voltage(11.4).present);
    assert!(!BatteryState::from_voltage(6.0).present);
    assert!(!BatteryState::from_voltage(5.1).present);
}

#[test]
fn test_hub_latches_mode() {
    let hub = TelemetryHub::new();
    assert_eq!(hub.latest_mode(), None);
    hub.publish(Telemetry::Mode(Mode::Armed));
    let watcher = hub.watch_mode();
    assert_eq!(*watcher.borrow(), Some(Mode::Armed));
}

#[tokio::test]
async fn test_battery_sidecar_publishes() {
    let (device, probe) = gate();
    let hub = TelemetryHub::new();
    let mut rx = hub.subscribe();
    probe.set_voltage(5.0);
    assert!(sample_once(&BatterySidecar, &device, &hub).await);
    match rx.recv().await.unwrap() {
        Telemetry::Battery(b) => {
            assert!(!b.present);
            assert!((b.voltage - 5.0).abs() < f64::EPSILON);
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn test_motor_sidecar_reports_range() {
    let (device, _probe) = gate();
    let hub = TelemetryHub::new();
    let mut rx = hub.subscribe();
    assert!(sample_once(&MotorSidecar::new((1000, 2000)), &device, &hub).await);
    let Telemetry::Motors(reading) = rx.recv().await.unwrap() else { panic!("expected motors") };
    assert_eq!((reading.minimum, reading.maximum), (1000, 2000));
    assert_eq!(reading.m2, 1000);
}

#[tokio::test]
async fn test_imu_sidecar_latches_attitude() {
    let (device, probe) = gate();
    let hub = TelemetryHub::new();
    let mut rx = hub.subscribe();
    probe.set_heading_decideg(2700);
    assert!(sample_once(&ImuSidecar, &device, &hub).await);

    let Telemetry::Imu(imu) = rx.recv().await.unwrap() else { panic!("expected imu") };
    let Telemetry::ImuRaw(raw) = rx.recv().await.unwrap() else { panic!("expected raw imu") };
    assert!((imu.attitude.yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    assert!(imu.attitude.roll.abs() < f64::EPSILON);
    assert!((raw.acceleration.z - imu.linear_acceleration.z).abs() < f64::EPSILON);
    assert_eq!(hub.latest_attitude(), Some(imu.attitude));
}

#[tokio::test]
async fn test_sidecar_skips_on_device_error() {
    let (device, probe) = gate();
    let hub = TelemetryHub::new();
    let mut rx = hub.subscribe();
    probe.set_link(false);
    assert!(!sample_once(&ImuSidecar, &device, &hub).await);
    assert!(rx.try_recv().is_err());
    assert_eq!(hub.latest_attitude(), None);
}

#[tokio::test]
async fn test_run_sidecar_until_cancelled() {
    let (device, _probe) = gate();
    let hub = Arc::new(TelemetryHub::new());
    let mut rx = hub.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_sidecar(
        Box::new(BatterySidecar),
        Duration::from_millis(5),
        device,
        Arc::clone(&hub),
        cancel.clone(),
    ));
    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(first, Telemetry::Battery(_)));
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
