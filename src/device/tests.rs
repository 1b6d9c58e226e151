use super::{
    Attitude, DeviceError, FlightController, PhysicalBoard, StartupError, VirtualBoard, msp,
    open_backend,
};
use crate::config::{DeviceBackend, SupervisorConfig};
use crate::flight_control::Mode;
use std::f64::consts::{FRAC_PI_2, PI};
use std::{
    ffi::CStr,
    fs::File,
    io::{Read, Write},
    os::fd::FromRawFd,
    path::PathBuf,
    thread::JoinHandle,
    time::{Duration, Instant},
};

fn board() -> (VirtualBoard, super::VirtualBoardProbe) {
    let config = SupervisorConfig::default();
    VirtualBoard::new(config.rc_commands, config.motor_command_range)
}

/// Opens a pseudo-terminal and returns its master side and the slave path.
fn pty() -> (File, PathBuf) {
    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(fd >= 0, "posix_openpt failed");
        assert_eq!(libc::grantpt(fd), 0);
        assert_eq!(libc::unlockpt(fd), 0);
        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
        let slave = PathBuf::from(CStr::from_ptr(name.as_ptr()).to_str().unwrap());
        (File::from_raw_fd(fd), slave)
    }
}

fn reply(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = msp::encode_request(cmd, payload).unwrap();
    frame[2] = b'>';
    frame
}

/// Plays the board: reads one request per entry of `replies` and answers with
/// the entry's bytes. Returns every request as `(cmd, payload)`.
fn serve(mut master: File, replies: Vec<Vec<u8>>) -> JoinHandle<Vec<(u8, Vec<u8>)>> {
    std::thread::spawn(move || {
        let mut requests = Vec::new();
        for bytes in replies {
            let mut header = [0u8; 5];
            master.read_exact(&mut header).unwrap();
            assert_eq!(&header[..3], b"$M<");
            let mut payload = vec![0u8; usize::from(header[3]) + 1];
            master.read_exact(&mut payload).unwrap();
            payload.pop();
            requests.push((header[4], payload));
            master.write_all(&bytes).unwrap();
        }
        requests
    })
}

fn open_physical(port: &std::path::Path) -> PhysicalBoard {
    PhysicalBoard::open(SupervisorConfig::default().rc_commands, port).unwrap()
}

#[test]
fn test_msp_request_frame() {
    let frame = msp::encode_request(msp::MSP_ATTITUDE, &[]).unwrap();
    assert_eq!(frame, vec![b'$', b'M', b'<', 0, 108, 108]);
    let frame = msp::encode_request(msp::MSP_SET_RAW_RC, &msp::encode_channels(&[1500, 1000])).unwrap();
    assert_eq!(&frame[..5], &[b'$', b'M', b'<', 4, 200]);
    assert_eq!(&frame[5..9], &[0xDC, 0x05, 0xE8, 0x03]);
    assert_eq!(frame[9], 4 ^ 200 ^ 0xDC ^ 0x05 ^ 0xE8 ^ 0x03);
    assert!(matches!(msp::encode_request(1, &[0; 256]), Err(msp::MspError::PayloadTooLong(256))));
}

#[test]
fn test_msp_channels_saturate() {
    let bytes = msp::encode_channels(&[40_000, -40_000]);
    assert_eq!(msp::read_i16s(&bytes), vec![i16::MAX, i16::MIN]);
}

#[test]
fn test_msp_decode_reply() {
    let payload = [0x10, 0x00, 0xF6, 0xFF, 0x5A, 0x00];
    let check = payload.iter().fold(6 ^ 108, |acc, b| acc ^ b);
    let mut buf = vec![0xAA, 0xBB, b'$', b'M', b'>', 6, 108];
    buf.extend_from_slice(&payload);
    buf.push(check);
    buf.push(b'$');

    let (frame, consumed) = msp::decode_reply(&buf).unwrap().unwrap();
    assert_eq!(consumed, buf.len() - 1);
    assert_eq!(frame.cmd, msp::MSP_ATTITUDE);
    assert!(!frame.rejected);
    assert_eq!(msp::read_i16s(&frame.payload), vec![16, -10, 90]);

    assert!(msp::decode_reply(&buf[..8]).unwrap().is_none());
    let mut corrupt = buf.clone();
    corrupt[7] ^= 0xFF;
    assert!(matches!(msp::decode_reply(&corrupt), Err(msp::MspError::BadChecksum { .. })));
}

#[test]
fn test_msp_discard_noise() {
    let mut buf = vec![0x01, 0x02, 0x03];
    msp::discard_noise(&mut buf);
    assert!(buf.is_empty());

    let mut buf = vec![0x01, b'M', b'$'];
    msp::discard_noise(&mut buf);
    assert_eq!(buf, vec![b'$']);

    let mut buf = vec![0x01, b'$', b'M', b'>', 0];
    msp::discard_noise(&mut buf);
    assert_eq!(buf, vec![b'$', b'M', b'>', 0]);
}

#[test]
fn test_msp_decode_rejected() {
    let buf = [b'$', b'M', b'!', 0, 205, 205];
    let (frame, _) = msp::decode_reply(&buf).unwrap().unwrap();
    assert!(frame.rejected);
    assert_eq!(frame.cmd, msp::MSP_ACC_CALIBRATION);
}

#[test]
fn test_attitude_heading_convention() {
    let level = Attitude::from_board_degrees(0.0, 0.0, 0.0, 0.0);
    assert!(level.yaw.abs() < 1e-12);
    let east = Attitude::from_board_degrees(0.0, 0.0, 90.0, 0.0);
    assert!((east.yaw - 3.0 * FRAC_PI_2).abs() < 1e-9);
    let offset = Attitude::from_board_degrees(18.0, -9.0, 270.0, FRAC_PI_2);
    assert!(offset.yaw.abs() < 1e-9);
    assert!((offset.roll - PI / 10.0).abs() < 1e-9);
    assert!((offset.pitch + PI / 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_virtual_board_arming() {
    let (mut board, probe) = board();
    let presets = board.presets().clone();
    assert_eq!(board.preset_for(Mode::Armed), Some(presets.arm));
    assert_eq!(board.preset_for(Mode::Flying), None);
    assert_eq!(board.motors_pwm().await.unwrap().m1, 1000);

    board.send_command(presets.arm).await.unwrap();
    assert!(probe.is_armed());
    board.send_command(presets.idle).await.unwrap();
    assert_eq!(board.motors_pwm().await.unwrap().m3, 1100);

    board.disarm().await.unwrap();
    assert!(!probe.is_armed());
    assert_eq!(probe.sent().await, vec![presets.arm, presets.idle, presets.disarm]);
}

#[tokio::test]
async fn test_virtual_board_log_is_bounded() {
    let (mut board, probe) = board();
    let presets = board.presets().clone();
    for _ in 0..VirtualBoard::SENT_LOG_LEN {
        board.send_command(presets.idle).await.unwrap();
    }
    board.send_command(presets.arm).await.unwrap();
    let sent = probe.sent().await;
    assert_eq!(sent.len(), VirtualBoard::SENT_LOG_LEN);
    assert_eq!(sent.last(), Some(&presets.arm));
    assert_eq!(probe.last_sent().await, Some(presets.arm));
}

#[tokio::test]
async fn test_virtual_board_readings() {
    let (mut board, probe) = board();
    let acc = board.acceleration().await.unwrap();
    assert!((acc.z - 9.81).abs() < 0.1);
    let gyro = board.gyro().await.unwrap();
    assert!(gyro.x.abs() < 0.2);
    probe.set_voltage(5.0);
    assert!((board.voltage().await.unwrap() - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_virtual_board_link_failure() {
    let (mut board, probe) = board();
    probe.set_link(false);
    let presets = board.presets().clone();
    assert!(matches!(board.send_command(presets.arm).await, Err(DeviceError::Communication(_))));
    assert!(board.attitude().await.is_err());
    assert!(probe.sent().await.is_empty());

    probe.set_link(true);
    board.send_command(presets.arm).await.unwrap();
    board.close().await;
    assert!(probe.is_closed());
    assert!(matches!(board.voltage().await, Err(DeviceError::Closed)));
}

#[tokio::test]
async fn test_open_backend() {
    let (gate, probe) = open_backend(&SupervisorConfig::default()).unwrap();
    assert!(probe.is_some());
    assert_eq!(gate.lock().await.type_name(), "VirtualBoard");

    let config = SupervisorConfig {
        device: DeviceBackend::Physical { port: PathBuf::from("/nonexistent/fc-supervisor-tty") },
        ..SupervisorConfig::default()
    };
    assert!(matches!(open_backend(&config), Err(StartupError::DeviceUnavailable { .. })));
}

#[tokio::test]
async fn test_physical_board_exchange() {
    let (master, port) = pty();
    let mut noisy_attitude = vec![0x00, 0x42, b'$'];
    noisy_attitude.extend(reply(msp::MSP_ANALOG, &[99]));
    noisy_attitude.extend(reply(msp::MSP_ATTITUDE, &msp::encode_channels(&[100, -50, 90])));
    let peer = serve(master, vec![
        reply(msp::MSP_SET_RAW_RC, &[]),
        noisy_attitude,
        reply(msp::MSP_ANALOG, &[111, 0, 0, 0, 0, 0, 0]),
        reply(msp::MSP_MOTOR, &msp::encode_channels(&[1100, 1200, 1300, 1400])),
    ]);
    let mut board = open_physical(&port);
    let presets = board.presets().clone();

    board.send_command(presets.arm).await.unwrap();
    let attitude = board.attitude().await.unwrap();
    assert!((attitude.roll - PI / 18.0).abs() < 1e-9);
    assert!((attitude.pitch + PI / 36.0).abs() < 1e-9);
    assert!((attitude.yaw - 3.0 * FRAC_PI_2).abs() < 1e-9);
    assert!((board.voltage().await.unwrap() - 11.1).abs() < 1e-9);
    let motors = board.motors_pwm().await.unwrap();
    assert_eq!((motors.m1, motors.m4), (1100, 1400));

    let requests = peer.join().unwrap();
    let cmds: Vec<u8> = requests.iter().map(|(cmd, _)| *cmd).collect();
    assert_eq!(cmds, vec![msp::MSP_SET_RAW_RC, msp::MSP_ATTITUDE, msp::MSP_ANALOG, msp::MSP_MOTOR]);
    let mut channels = presets.arm.channels().to_vec();
    channels.extend([1500, 1500]);
    assert_eq!(msp::read_i16s(&requests[0].1), msp::read_i16s(&msp::encode_channels(&channels)));
}

#[tokio::test]
async fn test_physical_board_recovers_after_timeout() {
    let (master, port) = pty();
    let partial = reply(msp::MSP_SET_RAW_RC, &[])[..4].to_vec();
    let peer = serve(master, vec![partial, reply(msp::MSP_SET_RAW_RC, &[])]);
    let mut board = open_physical(&port);
    let disarm = board.presets().disarm;

    let started = Instant::now();
    let first = board.send_command(disarm).await;
    assert!(matches!(first, Err(DeviceError::Timeout { cmd: msp::MSP_SET_RAW_RC })));
    assert!(started.elapsed() < Duration::from_secs(1));

    let second = tokio::time::timeout(Duration::from_secs(1), board.send_command(disarm)).await;
    assert!(matches!(second, Ok(Ok(()))));
    assert_eq!(peer.join().unwrap().len(), 2);
}

#[tokio::test]
async fn test_physical_board_protocol_errors() {
    let (master, port) = pty();
    let mut rejected = reply(msp::MSP_ACC_CALIBRATION, &[]);
    rejected[2] = b'!';
    let peer = serve(master, vec![
        rejected,
        reply(msp::MSP_ATTITUDE, &msp::encode_channels(&[100, -50])),
        reply(msp::MSP_MOTOR, &msp::encode_channels(&[1100, 1200])),
        reply(msp::MSP_ANALOG, &[]),
    ]);
    let mut board = open_physical(&port);

    let calibrate = board.calibrate_imu().await;
    assert!(matches!(calibrate, Err(DeviceError::Protocol { reason: "board rejected command", .. })));
    assert!(matches!(board.attitude().await, Err(DeviceError::Protocol { reason: "short payload", .. })));
    assert!(matches!(board.motors_pwm().await, Err(DeviceError::Protocol { reason: "short payload", .. })));
    assert!(matches!(board.voltage().await, Err(DeviceError::Protocol { reason: "short payload", .. })));
    assert_eq!(peer.join().unwrap().len(), 4);

    board.close().await;
    assert!(matches!(board.gyro().await, Err(DeviceError::Closed)));
}
