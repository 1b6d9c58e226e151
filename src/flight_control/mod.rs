mod command;
mod drone_mode;
mod heartbeat;
mod mode_state;
mod supervisor;

pub use command::{CommandComposer, CommandRange, CommandVector, ModePresets, StickCommand};
pub use drone_mode::Mode;
pub use heartbeat::{HeartbeatMonitor, HeartbeatSource};
pub use mode_state::{ModeResponse, ModeState};
pub use supervisor::{Supervisor, TickOutcome, TriggerResponse};
