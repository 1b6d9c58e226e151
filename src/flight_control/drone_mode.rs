use strum_macros::{Display, EnumIter};

/// Top-level arming mode of the drone.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Display, EnumIter, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Disarmed,
    Armed,
    Flying,
    /// Preset-only mode, never reachable through an external request.
    Idle,
    /// Any wire value outside the known modes.
    Unknown,
}

impl Mode {
    /// Only these modes may be requested from outside the supervisor.
    pub fn is_requestable(self) -> bool { matches!(self, Mode::Disarmed | Mode::Armed | Mode::Flying) }

    /// Modes that spin (or may spin) the motors and are therefore gated by the failsafe.
    pub fn is_active(self) -> bool { matches!(self, Mode::Armed | Mode::Flying) }
}

impl From<u8> for Mode {
    fn from(value: u8) -> Self {
        match value {
            0 => Mode::Disarmed,
            1 => Mode::Armed,
            2 => Mode::Flying,
            3 => Mode::Idle,
            _ => Mode::Unknown,
        }
    }
}

impl From<Mode> for u8 {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Disarmed => 0,
            Mode::Armed => 1,
            Mode::Flying => 2,
            Mode::Idle => 3,
            Mode::Unknown => u8::MAX,
        }
    }
}
