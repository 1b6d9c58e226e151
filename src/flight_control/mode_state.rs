use super::drone_mode::Mode;
use crate::event;

/// Reply to a mode-change request, reflecting the state after the safety override.
#[derive(Debug, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ModeResponse {
    pub previous_mode: Mode,
    pub current_mode: Mode,
}

/// Arming state machine.
///
/// `current` is what was last applied to the device, `requested` is what is wanted
/// now. Every transition first hands the previous request over to `current` and only
/// then stores the new target, so `current` trails `requested` by one transition.
#[derive(Debug, Clone)]
pub struct ModeState {
    current: Mode,
    requested: Mode,
    last_published: Option<Mode>,
}

impl ModeState {
    pub fn new() -> Self {
        Self { current: Mode::Disarmed, requested: Mode::Disarmed, last_published: None }
    }

    pub fn current(&self) -> Mode { self.current }

    pub fn requested(&self) -> Mode { self.requested }

    pub fn last_published(&self) -> Option<Mode> { self.last_published }

    pub fn apply_transition(&mut self, target: Mode) {
        self.current = self.requested;
        self.requested = target;
    }

    /// Handles an external request.
    ///
    /// # Arguments
    /// * `mode` – The desired mode; anything not requestable leaves the state untouched.
    /// * `failsafe` – Whether the heartbeat monitor currently demands a disarm. If so,
    ///   `Armed` and `Flying` are turned into `Disarmed`.
    ///
    /// # Returns
    /// The `(previous, current)` pair after the request was applied.
    pub fn request(&mut self, mode: Mode, failsafe: bool) -> ModeResponse {
        if !mode.is_requestable() {
            event!("Ignoring request for non-requestable mode {mode}");
            return self.response();
        }
        let target = if mode.is_active() && failsafe { Mode::Disarmed } else { mode };
        self.apply_transition(target);
        self.response()
    }

    pub fn response(&self) -> ModeResponse {
        ModeResponse { previous_mode: self.current, current_mode: self.requested }
    }

    /// Returns the requested mode if it differs from the last published one and
    /// marks it as published.
    pub fn take_unpublished(&mut self) -> Option<Mode> {
        if self.last_published == Some(self.requested) {
            return None;
        }
        self.last_published = Some(self.requested);
        Some(self.requested)
    }
}

impl Default for ModeState {
    fn default() -> Self { Self::new() }
}
