//! Core library for the apt_motion driver.
//!
//! This library contains the APT packet protocol engine used to talk to
//! Thorlabs-style motion controllers, and the axis collection traits used to
//! compose simple positioning stages into multi-axis systems.
//!
//! - [`protocol`]: packet framing, timeouts and the request/response engine.
//! - [`hardware`]: byte-stream transports the engine runs over.
//! - [`axis`]: axis collections, including the major/minor composite.

pub mod axis;
pub mod config;
pub mod error;
pub mod hardware;
pub mod protocol;
pub mod telemetry;

pub use error::{AppResult, MotionError};
