//! Custom error types for the driver.
//!
//! This module defines the primary error type, `MotionError`, shared by the
//! protocol engine, the transports and the axis collections. Using the
//! `thiserror` crate, it keeps every failure the caller can observe in one
//! enum so that `?` works across layers.
//!
//! ## Error Hierarchy
//!
//! - **`Io`**: Transport failures, carried through unchanged from the byte stream.
//! - **`NoResponse`** / **`MessageIdMismatch`**: Communication errors from
//!   `query_packet`. Both answer true to [`MotionError::is_communication`].
//! - **`MalformedPacket`**: Bytes that do not form a valid APT packet, or a
//!   packet that could not be encoded.
//! - **`AxisCountMismatch`** / **`InvalidArgument`** / **`OutOfLimits`**: Usage
//!   errors raised by axis collections before any hardware is touched.
//! - **`Config`** / **`Configuration`**: Loading and validation of [`crate::config::Settings`].

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type AppResult<T> = std::result::Result<T, MotionError>;

/// Every failure the driver reports.
#[derive(Error, Debug)]
pub enum MotionError {
    /// The transport failed to read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply was expected but none arrived before the timeout.
    #[error("Expected packet {expected:#06x}, got nothing instead")]
    NoResponse {
        /// Message ID the caller was waiting for.
        expected: u16,
    },

    /// The reply carried another message ID than the one expected.
    #[error("APT returned message ID {received:#06x}, expected {expected:#06x}")]
    MessageIdMismatch {
        /// Message ID of the reply.
        received: u16,
        /// Message ID the caller was waiting for.
        expected: u16,
    },

    /// Bytes that do not decode as one packet, or a packet that cannot be framed.
    #[error("Malformed APT packet: {0}")]
    MalformedPacket(String),

    /// A per-axis argument has the wrong number of entries.
    #[error("Argument '{argument}' has {actual} entries, expected one per axis ({expected})")]
    AxisCountMismatch {
        /// Name of the offending argument.
        argument: &'static str,
        /// Axis count of the collection.
        expected: usize,
        /// Entries supplied.
        actual: usize,
    },

    /// An argument is unusable for reasons other than its length.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A target lies outside the limits of its axis.
    #[error("Axis {axis} target {value} outside limits [{lower}, {upper}]")]
    OutOfLimits {
        /// Index of the axis within the collection.
        axis: usize,
        /// Requested target.
        value: f64,
        /// Lower limit of the axis.
        lower: f64,
        /// Upper limit of the axis.
        upper: f64,
    },

    /// Settings could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(String),
}

impl MotionError {
    /// True for failures of the request/response exchange itself, as opposed
    /// to transport or usage errors.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            MotionError::NoResponse { .. } | MotionError::MessageIdMismatch { .. }
        )
    }
}
