//! Configuration using Figment
//!
//! Settings are loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables (prefixed with `APT_MOTION_`, `__` between sections)
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! APT_MOTION_PROTOCOL__POLL_INTERVAL=5ms
//! APT_MOTION_SERIAL__PORT=/dev/ttyUSB1
//! ```
//!
//! # Example
//!
//! ```toml
//! [protocol]
//! poll_interval = "10ms"
//! query_timeout = "500ms"
//! move_timeout = "30s"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! read_timeout = "50ms"
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, MotionError};
use crate::protocol::QueryTimeout;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "APT_MOTION_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Packet engine settings
    #[serde(default)]
    pub protocol: ProtocolSettings,
    /// Serial transport settings
    #[serde(default)]
    pub serial: SerialSettings,
}

/// Packet engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Wait between re-sends while a query is unanswered
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Query timeout for commands issued by axis collections; absent inherits
    /// the transport's read timeout
    #[serde(default, with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
    /// How long to wait for a move-completed reply
    #[serde(default = "default_move_timeout", with = "humantime_serde")]
    pub move_timeout: Duration,
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Serial port (e.g., "/dev/ttyUSB0", "COM3")
    #[serde(default = "default_port")]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Bound on a single read attempt
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_move_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout() -> Duration {
    Duration::from_millis(50)
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            query_timeout: None,
            move_timeout: default_move_timeout(),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout: default_read_timeout(),
        }
    }
}

impl ProtocolSettings {
    /// Timeout applied to queries that do not specify their own.
    pub fn default_query_timeout(&self) -> QueryTimeout {
        QueryTimeout::from_setting(self.query_timeout)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Figment with the TOML file, then environment overrides. Absent keys
    /// fall back to the serde defaults above.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration from `path` and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Self::figment(path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks:
    /// - Poll interval is non-zero
    /// - Serial port name is non-empty and baud rate non-zero
    pub fn validate(&self) -> AppResult<()> {
        if self.protocol.poll_interval.is_zero() {
            return Err(MotionError::Configuration(
                "protocol.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.serial.port.trim().is_empty() {
            return Err(MotionError::Configuration(
                "serial.port cannot be empty".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(MotionError::Configuration(
                "serial.baud_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
