//! APT packet protocol.
//!
//! - [`packet`]: binary framing of a single message.
//! - [`frame`]: splitting a received byte stream into frames.
//! - [`timeout`]: inherit / indefinite / bounded query timeouts.
//! - [`clock`]: the time source the query loop polls against.
//! - [`engine`]: send and query over a [`crate::hardware::Transport`].

pub mod clock;
pub mod engine;
pub mod frame;
pub mod packet;
pub mod timeout;

pub use clock::{Clock, ManualClock, TokioClock};
pub use engine::AptEngine;
pub use frame::FrameBuffer;
pub use packet::AptPacket;
pub use timeout::{QueryTimeout, TimeQuantity};
