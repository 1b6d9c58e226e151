use crate::device::StartupError;
use crate::flight_control::{CommandRange, CommandVector, HeartbeatSource, ModePresets};
use crate::warn;
use chrono::TimeDelta;
use std::{env, path::PathBuf, time::Duration};

/// Loop frequencies in Hz for the control loop and each telemetry sidecar.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Frequency {
    pub commands: f64,
    pub imu: f64,
    pub motors: f64,
    pub battery: f64,
}

impl Default for Frequency {
    fn default() -> Self { Self { commands: 50.0, imu: 30.0, motors: 10.0, battery: 1.0 } }
}

/// Per-source heartbeat enable flags.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Heartbeats {
    pub joystick: bool,
    pub pid: bool,
    pub altitude: bool,
    pub state_estimator: bool,
}

impl Heartbeats {
    pub fn is_enabled(&self, source: HeartbeatSource) -> bool {
        match source {
            HeartbeatSource::Joystick => self.joystick,
            HeartbeatSource::Pid => self.pid,
            HeartbeatSource::Altitude => self.altitude,
            HeartbeatSource::StateEstimator => self.state_estimator,
        }
    }
}

impl Default for Heartbeats {
    fn default() -> Self { Self { joystick: true, pid: false, altitude: false, state_estimator: false } }
}

/// Selects the flight controller backend once at startup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceBackend {
    /// In-process simulated board.
    Virtual,
    /// MSP board attached to the given serial device node.
    Physical { port: PathBuf },
}

/// Complete supervisor configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SupervisorConfig {
    pub frequency: Frequency,
    pub heartbeats: Heartbeats,
    /// Maximum heartbeat age before a failsafe disarm, in seconds.
    pub heartbeat_threshold_secs: f64,
    pub rc_commands: ModePresets,
    /// Bounds every composed channel is clamped to.
    pub command_range: CommandRange,
    /// PWM range reported alongside motor readbacks.
    pub motor_command_range: (u16, u16),
    pub shutdown_grace_ms: u64,
    pub device: DeviceBackend,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            frequency: Frequency::default(),
            heartbeats: Heartbeats::default(),
            heartbeat_threshold_secs: 1.0,
            rc_commands: ModePresets {
                disarm: CommandVector::new(1500, 1500, 1500, 900, 1000, 1000),
                arm: CommandVector::new(1500, 1500, 1500, 1000, 1900, 1000),
                idle: CommandVector::new(1500, 1500, 1500, 1100, 1900, 1000),
                flying: None,
            },
            command_range: CommandRange { min: -2000, max: 2000 },
            motor_command_range: (1000, 2000),
            shutdown_grace_ms: 500,
            device: DeviceBackend::Virtual,
        }
    }
}

impl SupervisorConfig {
    /// Environment variable selecting the backend: `virtual` or a serial device path.
    pub const DEVICE_VAR: &'static str = "FC_DEVICE";
    /// Environment variable overriding the control loop frequency in Hz.
    pub const COMMAND_HZ_VAR: &'static str = "FC_COMMAND_HZ";
    /// Environment variable overriding the heartbeat threshold in seconds.
    pub const HEARTBEAT_THR_VAR: &'static str = "FC_HEARTBEAT_THRESHOLD";
    /// Upper bound for every loop frequency.
    pub const MAX_FREQUENCY_HZ: f64 = 1000.0;

    /// Builds the default configuration and applies the environment overrides.
    /// Malformed numeric overrides are reported and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dev) = env::var(Self::DEVICE_VAR) {
            config.device = if dev.eq_ignore_ascii_case("virtual") {
                DeviceBackend::Virtual
            } else {
                DeviceBackend::Physical { port: PathBuf::from(dev) }
            };
        }
        if let Some(hz) = Self::positive_f64(Self::COMMAND_HZ_VAR) {
            config.frequency.commands = hz;
        }
        if let Some(thr) = Self::positive_f64(Self::HEARTBEAT_THR_VAR) {
            config.heartbeat_threshold_secs = thr;
        }
        config
    }

    fn positive_f64(var: &str) -> Option<f64> {
        let raw = env::var(var).ok()?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Some(v),
            _ => {
                warn!("Ignoring invalid value '{raw}' for {var}");
                None
            }
        }
    }

    /// Rejects configurations the loops cannot run with.
    pub fn validate(&self) -> Result<(), StartupError> {
        let Frequency { commands, imu, motors, battery } = self.frequency;
        for (name, hz) in [("commands", commands), ("imu", imu), ("motors", motors), ("battery", battery)] {
            if !(hz.is_finite() && hz > 0.0 && hz <= Self::MAX_FREQUENCY_HZ) {
                return Err(StartupError::InvalidConfig(format!(
                    "{name} frequency must be in (0, {}] Hz, got {hz}",
                    Self::MAX_FREQUENCY_HZ
                )));
            }
        }
        if !(self.heartbeat_threshold_secs.is_finite() && self.heartbeat_threshold_secs > 0.0) {
            return Err(StartupError::InvalidConfig("heartbeat threshold must be positive".to_string()));
        }
        if self.command_range.min > self.command_range.max {
            return Err(StartupError::InvalidConfig("command range is empty".to_string()));
        }
        if self.motor_command_range.0 > self.motor_command_range.1 {
            return Err(StartupError::InvalidConfig("motor command range is empty".to_string()));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn heartbeat_threshold(&self) -> TimeDelta {
        TimeDelta::milliseconds((self.heartbeat_threshold_secs * 1000.0).round() as i64)
    }

    pub fn shutdown_grace(&self) -> Duration { Duration::from_millis(self.shutdown_grace_ms) }

    /// Tick period for a loop running at `hz`, which must have passed [`Self::validate`].
    pub fn period(hz: f64) -> Duration { Duration::from_secs_f64(1.0 / hz) }
}

#[cfg(test)]
mod tests {
    use super::SupervisorConfig;
    use crate::device::StartupError;
    use crate::flight_control::CommandRange;

    #[test]
    fn test_default_config_is_valid() {
        let config = SupervisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_threshold().num_milliseconds(), 1000);
        assert_eq!(SupervisorConfig::period(4.0).as_millis(), 250);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SupervisorConfig::default();
        config.frequency.imu = 0.0;
        assert!(matches!(config.validate(), Err(StartupError::InvalidConfig(_))));

        let mut config = SupervisorConfig::default();
        config.frequency.commands = 1e10;
        assert!(matches!(config.validate(), Err(StartupError::InvalidConfig(_))));
        config.frequency.commands = SupervisorConfig::MAX_FREQUENCY_HZ;
        assert!(config.validate().is_ok());
        assert!(!SupervisorConfig::period(config.frequency.commands).is_zero());

        let config = SupervisorConfig {
            command_range: CommandRange { min: 10, max: -10 },
            ..SupervisorConfig::default()
        };
        assert!(matches!(config.validate(), Err(StartupError::InvalidConfig(_))));
    }
}
