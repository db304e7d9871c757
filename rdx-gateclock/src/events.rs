//! Defines all public event types broadcast by the Gateclock engine.
//!
//! Callbacks registered through `on_gate_start` / `on_remind` are the primary
//! contract. These broadcast events carry the same edges with their payload
//! attached, for listeners that want to know *which* gate fired.

use crate::common::{ListenerId, WINDOW_LEN};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Edges of the gate cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// The reminder lead for `gate` has been reached.
    ReminderDue {
        gate: DateTime<Tz>,
        remind_in_minutes: u32,
    },
    /// `gate` has started. `next_gates` is the window after rollover.
    GateStarted {
        gate: DateTime<Tz>,
        next_gates: [DateTime<Tz>; WINDOW_LEN],
    },
}

/// Events related to the lifecycle and state of the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Fired once when the tick loop begins.
    EngineStarted { timestamp: DateTime<Utc> },
    /// Fired once when the tick loop has exited.
    EngineShutdown,
    /// Fired when a callback is registered.
    ListenerAdded { id: ListenerId },
    /// Fired when a callback is removed.
    ListenerRemoved { id: ListenerId },
    /// Fired after the reminder lead changed mid-cycle.
    ReminderReconfigured {
        remind_in_minutes: u32,
        reminder_fired: bool,
    },
}
