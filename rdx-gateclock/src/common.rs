//! Contains common, primitive types and the constants that define the gate grid.
//!
//! The grid itself is never stored as data: gates open at minute 0, 20 and 40
//! of every hour, at second 0. Everything here is either a constant describing
//! that grid or a small validated value derived from it.

use crate::error::GateClockError;
use serde::Deserialize;
use slotmap::new_key_type;

/// Minutes between two consecutive gates.
pub const GRID_STEP_MINUTES: i64 = 20;

/// Milliseconds between two consecutive gates.
pub const GRID_STEP_MS: i64 = GRID_STEP_MINUTES * 60 * 1000;

/// Number of upcoming gates kept in the preview window.
pub const WINDOW_LEN: usize = 3;

/// Slack applied when deciding that a gate has started.
///
/// The tick loop runs on a coarse timer, so the exact zero crossing can be
/// missed. Any countdown at or below this value counts as "started".
pub const START_TOLERANCE_MS: i64 = 3000;

/// Nominal period of the tick loop.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Largest reminder lead that still leaves an un-fired window inside one cycle.
pub const MAX_REMIND_MINUTES: u32 = (GRID_STEP_MINUTES as u32) - 1;

new_key_type! {
    /// Uniquely identifies a callback registered with the engine.
    ///
    /// Returned by `on_gate_start` and `on_remind`, and accepted by
    /// `remove_listener`. Keys are never reused, so a stale id cannot remove
    /// somebody else's callback.
    pub struct ListenerId;
}

/// How many minutes before a gate the reminder fires.
///
/// Zero means the reminder is disabled. Values that would reach a full cycle
/// are rejected at construction, so the tracker never has to guess what a
/// 25-minute lead on a 20-minute grid means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "u32")]
pub struct ReminderLead(u32);

impl ReminderLead {
    /// A disabled reminder.
    pub const DISABLED: Self = Self(0);

    pub fn new(minutes: u32) -> Result<Self, GateClockError> {
        if minutes > MAX_REMIND_MINUTES {
            return Err(GateClockError::LeadOutOfRange {
                minutes,
                max: MAX_REMIND_MINUTES,
            });
        }
        Ok(Self(minutes))
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn millis(self) -> i64 {
        i64::from(self.0) * 60 * 1000
    }

    pub fn is_enabled(self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<u32> for ReminderLead {
    type Error = GateClockError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}
