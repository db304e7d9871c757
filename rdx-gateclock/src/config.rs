//! Defines all configuration structures for the Gateclock engine.
//!
//! These structs are deserialized with `serde` from layered sources: an
//! optional TOML file, then `GATECLOCK_*` environment variables on top.
//!
//! ```toml
//! timezone = "Europe/Berlin"
//! remind_in_minutes = 5
//! resolution = "standard"
//! ```

use crate::common::{ReminderLead, DEFAULT_TICK_MS};
use crate::error::GateClockError;
use chrono_tz::Tz;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// File looked up in the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "gateclock.toml";

/// The top-level configuration for the `GateClockEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct GateClockConfig {
    /// The period of the tick loop.
    #[serde(default)]
    pub resolution: ClockResolution,

    /// The zone whose local hour the 20-minute grid is laid on.
    /// Uses IANA names (e.g. "America/New_York"). Defaults to the host's
    /// zone, or UTC when that cannot be determined.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Minutes before each gate to fire the reminder. 0 disables it.
    #[serde(default)]
    pub remind_in_minutes: ReminderLead,
}

/// How often the tick loop runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// One tick per second.
    #[default]
    Standard,
    /// A user-defined period. The start tolerance stays fixed at 3 seconds,
    /// so periods longer than that can detect a gate late.
    Custom { period_ms: u64 },
}

impl ClockResolution {
    pub fn period(&self) -> Duration {
        match self {
            ClockResolution::Standard => Duration::from_millis(DEFAULT_TICK_MS),
            ClockResolution::Custom { period_ms } => Duration::from_millis(*period_ms),
        }
    }
}

impl Default for GateClockConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            timezone: default_timezone(),
            remind_in_minutes: ReminderLead::DISABLED,
        }
    }
}

impl GateClockConfig {
    /// Loads the configuration from `path` (required) or from
    /// [`DEFAULT_CONFIG_FILE`] (optional), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, GateClockError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Self::from_builder(
            Config::builder()
                .add_source(file)
                .add_source(Environment::with_prefix("GATECLOCK").try_parsing(true)),
        )
    }

    /// Parses a TOML document, without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, GateClockError> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, GateClockError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), GateClockError> {
        if self.resolution.period().is_zero() {
            return Err(GateClockError::InvalidTickPeriod);
        }
        Ok(())
    }
}

fn default_timezone() -> Tz {
    system_timezone().unwrap_or(Tz::UTC)
}

/// The host's IANA zone, if it can be read and is known to `chrono-tz`.
pub fn system_timezone() -> Option<Tz> {
    let name = iana_time_zone::get_timezone().ok()?;
    name.parse().ok()
}
