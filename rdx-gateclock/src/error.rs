//! Error types for the Gateclock library.
//!
//! The countdown arithmetic itself cannot fail. Errors only arise at the
//! configuration boundary, where user-supplied values are validated before
//! they reach the tracker.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateClockError {
    /// A reminder lead that would span a whole cycle (or more).
    #[error("reminder lead of {minutes} minutes is out of range (0..={max})")]
    LeadOutOfRange { minutes: u32, max: u32 },

    /// A tick period of zero would spin the loop.
    #[error("tick period must be greater than zero")]
    InvalidTickPeriod,

    /// Failed to load or deserialize the configuration sources.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
