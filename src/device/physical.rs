use super::{
    StartupError,
    flight_controller::{
        ACC_RAW_TO_MSS, Attitude, DeviceError, FlightController, GYRO_RAW_TO_DEG_S, MotorPwm, Vec3,
    },
    msp::{self, MspFrame},
};
use crate::flight_control::{CommandVector, ModePresets};
use crate::{info, warn};
use async_trait::async_trait;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::unix::AsyncFd;

/// MSP board attached to a serial device node.
///
/// The node is opened non-blocking and switched to raw mode at [`Self::BAUD_RATE`],
/// so an abandoned exchange leaves nothing pending on the port.
pub struct PhysicalBoard {
    presets: ModePresets,
    port: PathBuf,
    fd: Option<AsyncFd<File>>,
    rx_buf: Vec<u8>,
    yaw_offset: f64,
}

impl PhysicalBoard {
    const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);
    const BAUD_RATE: libc::speed_t = libc::B115200;
    /// `SET_RAW_RC` carries eight channels, the two unused ones are held centered.
    const SPARE_CHANNEL: i32 = 1500;
    const READ_CHUNK: usize = 64;

    pub fn open(presets: ModePresets, port: &Path) -> Result<Self, StartupError> {
        let fd = Self::open_port(port).map_err(|e| StartupError::DeviceUnavailable {
            port: port.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Opened flight controller at {}", port.display());
        Ok(Self { presets, port: port.to_path_buf(), fd: Some(fd), rx_buf: Vec::new(), yaw_offset: 0.0 })
    }

    fn open_port(port: &Path) -> io::Result<AsyncFd<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(port)?;
        Self::configure_line(&file)?;
        AsyncFd::new(file)
    }

    /// Puts the tty into raw 8N1 mode at [`Self::BAUD_RATE`].
    fn configure_line(file: &File) -> io::Result<()> {
        let fd = file.as_raw_fd();
        // SAFETY: `termios` is plain old data and is filled by `tcgetattr` before use.
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is a valid open descriptor for the lifetime of `file`.
        if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `tio` was initialized by `tcgetattr` above.
        unsafe { libc::cfmakeraw(&mut tio) };
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        // SAFETY: see above.
        if unsafe { libc::cfsetspeed(&mut tio, Self::BAUD_RATE) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: see above.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    async fn write_frame(fd: &AsyncFd<File>, mut frame: &[u8]) -> io::Result<()> {
        while !frame.is_empty() {
            let mut guard = fd.writable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(frame)
            }) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(written)) => frame = &frame[written..],
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }

    async fn read_chunk(fd: &AsyncFd<File>, chunk: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = fd.readable().await?;
            if let Ok(read) = guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(chunk)
            }) {
                return read;
            }
        }
    }

    /// Sends `cmd` and waits for the matching reply.
    ///
    /// The whole exchange runs under [`Self::RESPONSE_TIMEOUT`]. On timeout the
    /// receive buffer is discarded, so a late reply is dropped as stale.
    async fn request(&mut self, cmd: u8, payload: &[u8]) -> Result<MspFrame, DeviceError> {
        let frame = msp::encode_request(cmd, payload)
            .map_err(|e| DeviceError::Protocol { cmd, reason: e.reason() })?;
        let result = tokio::time::timeout(Self::RESPONSE_TIMEOUT, self.exchange(cmd, &frame)).await;
        match result {
            Ok(reply) => reply,
            Err(_) => {
                self.rx_buf.clear();
                Err(DeviceError::Timeout { cmd })
            }
        }
    }

    async fn exchange(&mut self, cmd: u8, frame: &[u8]) -> Result<MspFrame, DeviceError> {
        let fd = self.fd.as_ref().ok_or(DeviceError::Closed)?;
        Self::write_frame(fd, frame).await?;

        let mut chunk = [0u8; Self::READ_CHUNK];
        loop {
            msp::discard_noise(&mut self.rx_buf);
            match msp::decode_reply(&self.rx_buf) {
                Ok(Some((reply, consumed))) => {
                    self.rx_buf.drain(..consumed);
                    if reply.cmd != cmd {
                        warn!("Dropping stale MSP reply to command {}", reply.cmd);
                        continue;
                    }
                    if reply.rejected {
                        return Err(DeviceError::Protocol { cmd, reason: "board rejected command" });
                    }
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    self.rx_buf.clear();
                    return Err(DeviceError::Protocol { cmd, reason: e.reason() });
                }
            }
            let read = Self::read_chunk(fd, &mut chunk).await?;
            if read == 0 {
                return Err(DeviceError::Communication(format!(
                    "{} closed by the board",
                    self.port.display()
                )));
            }
            self.rx_buf.extend_from_slice(&chunk[..read]);
        }
    }

    async fn request_words(&mut self, cmd: u8, words: usize) -> Result<Vec<i16>, DeviceError> {
        let reply = self.request(cmd, &[]).await?;
        let values = msp::read_i16s(&reply.payload);
        if values.len() < words {
            return Err(DeviceError::Protocol { cmd, reason: "short payload" });
        }
        Ok(values)
    }
}

#[async_trait]
impl FlightController for PhysicalBoard {
    fn type_name(&self) -> &'static str { "PhysicalBoard" }

    fn presets(&self) -> &ModePresets { &self.presets }

    async fn send_command(&mut self, command: CommandVector) -> Result<(), DeviceError> {
        let mut channels = command.channels().to_vec();
        channels.extend([Self::SPARE_CHANNEL, Self::SPARE_CHANNEL]);
        self.request(msp::MSP_SET_RAW_RC, &msp::encode_channels(&channels)).await?;
        Ok(())
    }

    async fn acceleration(&mut self) -> Result<Vec3, DeviceError> {
        let raw = self.request_words(msp::MSP_RAW_IMU, 6).await?;
        let acc = Vec3::new(f64::from(raw[0]), f64::from(raw[1]), f64::from(raw[2]));
        Ok(acc.map(|v| v * ACC_RAW_TO_MSS))
    }

    async fn gyro(&mut self) -> Result<Vec3, DeviceError> {
        let raw = self.request_words(msp::MSP_RAW_IMU, 6).await?;
        let gyro = Vec3::new(f64::from(raw[3]), f64::from(raw[4]), f64::from(raw[5]));
        Ok(gyro.map(|v| v * GYRO_RAW_TO_DEG_S))
    }

    async fn attitude(&mut self) -> Result<Attitude, DeviceError> {
        let raw = self.request_words(msp::MSP_ATTITUDE, 3).await?;
        Ok(Attitude::from_board_degrees(
            f64::from(raw[0]) / 10.0,
            f64::from(raw[1]) / 10.0,
            f64::from(raw[2]),
            self.yaw_offset,
        ))
    }

    async fn voltage(&mut self) -> Result<f64, DeviceError> {
        let reply = self.request(msp::MSP_ANALOG, &[]).await?;
        let vbat = reply
            .payload
            .first()
            .copied()
            .ok_or(DeviceError::Protocol { cmd: msp::MSP_ANALOG, reason: "short payload" })?;
        Ok(f64::from(vbat) / 10.0)
    }

    async fn motors_pwm(&mut self) -> Result<MotorPwm, DeviceError> {
        let reply = self.request(msp::MSP_MOTOR, &[]).await?;
        let words = msp::read_u16s(&reply.payload);
        match *words.as_slice() {
            [m1, m2, m3, m4, ..] => Ok(MotorPwm { m1, m2, m3, m4 }),
            _ => Err(DeviceError::Protocol { cmd: msp::MSP_MOTOR, reason: "short payload" }),
        }
    }

    async fn calibrate_imu(&mut self) -> Result<(), DeviceError> {
        self.request(msp::MSP_ACC_CALIBRATION, &[]).await?;
        Ok(())
    }

    fn yaw_offset(&self) -> f64 { self.yaw_offset }

    fn set_yaw_offset(&mut self, offset: f64) { self.yaw_offset = offset; }

    async fn close(&mut self) {
        if self.fd.take().is_some() {
            self.rx_buf.clear();
            info!("Released flight controller at {}", self.port.display());
        }
    }
}
