//! # Gateclock
//!
//! A drift-tolerant countdown engine for events that repeat on a fixed grid:
//! minute 0, 20 and 40 of every hour.
//!
//! Gateclock answers two questions every tick ("how long until the next
//! gate?" and "which gates come after it?") and fires two edge-triggered
//! callbacks, each at most once per cycle: a reminder a configurable number of
//! minutes before a gate, and a start notification when the gate opens.
//!
//! ## Core Concepts
//!
//! - **Schedule**: pure functions (`next_gate_after`, `build_window`) that snap
//!   any instant to the grid.
//! - **Tracker**: the per-cycle state machine. It owns the countdown, the
//!   preview window and the reminder/start flags, and rolls them over when a
//!   gate starts.
//! - **Engine**: a cloneable handle that drives the tracker from a recurring
//!   timer and invokes registered callbacks synchronously inside each tick.
//! - **Configuration-Driven**: tick period, time zone and reminder lead are
//!   defined by a `GateClockConfig`, usually loaded from a TOML file.
//!
//! ## Known limitations
//!
//! Clock jumps are not detected explicitly. A forward jump makes the next tick
//! see a non-positive countdown, fire the start callback once and resync the
//! window. A backward jump produces a larger countdown for one tick, which is
//! corrected on the next because the countdown is always recomputed from
//! absolute instants.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gateclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GateClockConfig::default();
//!     let engine = GateClockEngine::new(config)?;
//!
//!     engine.on_gate_start(|| println!("Gate is starting!")).await;
//!     engine.on_remind(|| println!("Gate starts soon!")).await;
//!     engine.set_remind_in_minutes(5).await?;
//!
//!     // Runs until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Gate Clock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod schedule;
pub mod time;
pub mod tracker;

/// A prelude module for easy importing of the most common Gateclock types.
pub mod prelude {
    pub use crate::common::{ListenerId, ReminderLead};
    pub use crate::config::{ClockResolution, GateClockConfig};
    pub use crate::engine::GateClockEngine;
    pub use crate::error::GateClockError;
    pub use crate::events::{GateEvent, SystemEvent};
    pub use crate::schedule::{build_window, next_gate_after};
    pub use crate::tracker::{GateSnapshot, GateTracker, TickOutcome};
}
