//! Splitting a byte stream into APT frames.
//!
//! A serial read returns whatever the driver has buffered, which may be half a
//! packet or several packets back to back. [`FrameBuffer`] accumulates those
//! chunks and hands out one complete frame at a time, using the header to
//! work out where each frame ends.

use bytes::{Bytes, BytesMut};

use crate::protocol::packet::{DATA_FLAG, HEADER_SIZE};

/// Accumulates received bytes and extracts complete APT frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Length of the frame at the front of the buffer, once its header is in.
    fn front_frame_len(&self) -> Option<usize> {
        if self.buffer.len() < HEADER_SIZE {
            return None;
        }
        if self.buffer[4] & DATA_FLAG == 0 {
            return Some(HEADER_SIZE);
        }
        let data_len = u16::from_le_bytes([self.buffer[2], self.buffer[3]]);
        Some(HEADER_SIZE + usize::from(data_len))
    }

    /// Take the next complete frame, leaving any surplus bytes buffered.
    ///
    /// Returns `None` while the front frame is still incomplete.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let len = self.front_frame_len()?;
        if self.buffer.len() < len {
            return None;
        }
        Some(self.buffer.split_to(len).freeze())
    }

    /// Take everything buffered, complete or not.
    pub fn take_remaining(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
