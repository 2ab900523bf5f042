//! Transports the packet engine runs over.
//!
//! - [`Transport`]: raw write / single-attempt read over a byte stream.
//! - [`MockTransport`]: scripted in-memory transport.
//! - `SerialTransport`: tokio-serial implementation (feature `instrument_serial`).

pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;
pub mod transport;

pub use mock::MockTransport;
#[cfg(feature = "instrument_serial")]
pub use serial::SerialTransport;
pub use transport::Transport;
