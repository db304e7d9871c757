//! Display helpers for countdowns and gate times.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Announcement for a gate start.
pub const START_MESSAGE: &str = "Gate is starting!";

/// Formats a countdown as `MM:SS`. Negative values show as `00:00`.
pub fn format_minutes_seconds(time_until_ms: i64) -> String {
    let total_secs = time_until_ms.max(0) / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Formats a gate as `HH:MM` in its own zone.
pub fn format_hours_minutes<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    instant.format("%H:%M").to_string()
}

/// Announcement for a reminder `minutes` ahead of a gate.
pub fn reminder_message(minutes: u32) -> String {
    format!("Gate will start in {minutes} minutes!")
}
