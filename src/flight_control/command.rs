use super::{drone_mode::Mode, mode_state::ModeState};
use std::fmt::{Display, Formatter};

/// Raw RC command `(roll, pitch, yaw, throttle, aux1, aux2)` sent to the board.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommandVector([i32; 6]);

impl CommandVector {
    pub const fn new(roll: i32, pitch: i32, yaw: i32, throttle: i32, aux1: i32, aux2: i32) -> Self {
        Self([roll, pitch, yaw, throttle, aux1, aux2])
    }

    pub fn roll(&self) -> i32 { self.0[0] }
    pub fn pitch(&self) -> i32 { self.0[1] }
    pub fn yaw(&self) -> i32 { self.0[2] }
    pub fn throttle(&self) -> i32 { self.0[3] }
    pub fn aux1(&self) -> i32 { self.0[4] }
    pub fn aux2(&self) -> i32 { self.0[5] }
    pub fn channels(&self) -> &[i32; 6] { &self.0 }
}

impl Display for CommandVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [r, p, y, t, a1, a2] = self.0;
        write!(f, "[R {r}, P {p}, Y {y}, T {t}, AUX {a1}/{a2}]")
    }
}

/// Stick command as received from the pilot or an autonomy node.
#[derive(Debug, PartialEq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct StickCommand {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub throttle: f64,
}

/// Inclusive bounds every composed channel is clamped to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CommandRange {
    pub min: i32,
    pub max: i32,
}

impl CommandRange {
    /// Truncates towards zero like an integer cast, maps non-finite values to 0
    /// and clamps the result.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clamp_stick(&self, value: f64) -> i32 {
        let raw = if value.is_finite() { value.trunc() } else { 0.0 };
        let bounded = raw.clamp(f64::from(self.min), f64::from(self.max));
        bounded as i32
    }

    pub fn clamp(&self, value: i32) -> i32 { value.clamp(self.min, self.max) }
}

/// Static RC commands per mode, straight from the board configuration.
#[derive(Debug, PartialEq, Eq, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModePresets {
    pub disarm: CommandVector,
    pub arm: CommandVector,
    pub idle: CommandVector,
    /// Flying is driven by stick input, boards normally carry no preset for it.
    pub flying: Option<CommandVector>,
}

impl ModePresets {
    pub fn preset_for(&self, mode: Mode) -> Option<CommandVector> {
        match mode {
            Mode::Disarmed => Some(self.disarm),
            Mode::Armed => Some(self.arm),
            Mode::Idle => Some(self.idle),
            Mode::Flying => self.flying,
            Mode::Unknown => None,
        }
    }
}

/// Turns the arming state and the latest stick input into the next RC command.
pub struct CommandComposer<'a> {
    presets: &'a ModePresets,
    range: CommandRange,
}

impl<'a> CommandComposer<'a> {
    pub fn new(presets: &'a ModePresets, range: CommandRange) -> Self { Self { presets, range } }

    /// The disarm preset, clamped like every other dispatched command.
    pub fn disarm(&self) -> CommandVector { self.bounded(self.presets.disarm) }

    /// Composes the command for the current tick.
    ///
    /// Disarm and arm requests are answered with their presets and silently advance
    /// the state machine so `current` catches up with the request. Flying passes the
    /// stick through with the idle aux channels; without a stick command the idle
    /// attitude channels are used with the motors-off throttle of the disarm preset.
    pub fn compose(&self, modes: &mut ModeState, stick: Option<&StickCommand>) -> CommandVector {
        match modes.requested() {
            Mode::Disarmed => {
                modes.apply_transition(Mode::Disarmed);
                self.disarm()
            }
            Mode::Armed => {
                if modes.current() != Mode::Armed {
                    modes.apply_transition(Mode::Armed);
                }
                self.bounded(self.presets.arm)
            }
            Mode::Flying => self.flying(stick),
            Mode::Idle | Mode::Unknown => self.disarm(),
        }
    }

    fn flying(&self, stick: Option<&StickCommand>) -> CommandVector {
        let idle = self.presets.idle;
        let aux1 = self.range.clamp(idle.aux1());
        let aux2 = self.range.clamp(idle.aux2());
        match stick {
            Some(s) => CommandVector::new(
                self.range.clamp_stick(s.roll),
                self.range.clamp_stick(s.pitch),
                self.range.clamp_stick(s.yaw),
                self.range.clamp_stick(s.throttle),
                aux1,
                aux2,
            ),
            None => CommandVector::new(
                self.range.clamp(idle.roll()),
                self.range.clamp(idle.pitch()),
                self.range.clamp(idle.yaw()),
                self.range.clamp(self.presets.disarm.throttle()),
                aux1,
                aux2,
            ),
        }
    }

    fn bounded(&self, preset: CommandVector) -> CommandVector {
        let [r, p, y, t, a1, a2] = preset.0.map(|c| self.range.clamp(c));
        CommandVector::new(r, p, y, t, a1, a2)
    }
}
