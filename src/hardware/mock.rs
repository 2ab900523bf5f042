//! Mock transport for testing without physical hardware.
//!
//! `MockTransport` replays a script of read results and logs every write, so
//! tests can check exactly what the engine put on the wire. Clones share the
//! same state: keep one handle for assertions and give another to the engine.
//!
//! # Example
//!
//! ```
//! use apt_motion::hardware::MockTransport;
//! use apt_motion::protocol::AptPacket;
//!
//! let transport = MockTransport::new();
//! transport.queue_silence(2);
//! transport.queue_packet(&AptPacket::short(0x0006, 0, 0, 0x01, 0x50).unwrap());
//! assert_eq!(transport.pending_reads(), 3);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use crate::hardware::transport::Transport;
use crate::protocol::{AptPacket, FrameBuffer};

#[derive(Debug, Default)]
struct MockState {
    reads: VecDeque<Bytes>,
    writes: Vec<Bytes>,
    read_attempts: usize,
    terminator: Option<String>,
    fail_next_write: Option<io::ErrorKind>,
    fail_next_read: Option<io::ErrorKind>,
    frames: Option<FrameBuffer>,
}

/// Scripted in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Transport whose reads return queued chunks verbatim.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that treats queued chunks as a byte stream and returns one
    /// APT frame per read, the way a serial port does.
    pub fn framed() -> Self {
        let transport = Self::default();
        transport.state.lock().frames = Some(FrameBuffer::new());
        transport
    }

    /// Queue raw bytes to be returned by a future read.
    pub fn queue_bytes(&self, bytes: impl Into<Bytes>) {
        self.state.lock().reads.push_back(bytes.into());
    }

    /// Queue a packed reply.
    pub fn queue_packet(&self, packet: &AptPacket) {
        self.queue_bytes(packet.pack());
    }

    /// Queue `count` empty reads ahead of whatever is queued next.
    pub fn queue_silence(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.reads.push_back(Bytes::new());
        }
    }

    /// Make the next write fail with `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next_write = Some(kind);
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next_read = Some(kind);
    }

    /// Every buffer written so far, oldest first.
    pub fn writes(&self) -> Vec<Bytes> {
        self.state.lock().writes.clone()
    }

    /// Written buffers decoded as packets; undecodable writes are skipped.
    pub fn written_packets(&self) -> Vec<AptPacket> {
        self.state
            .lock()
            .writes
            .iter()
            .filter_map(|raw| AptPacket::unpack(raw).ok())
            .collect()
    }

    /// Reads attempted so far, including failed and empty ones.
    pub fn read_attempts(&self) -> usize {
        self.state.lock().read_attempts
    }

    /// Scripted reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.state.lock().reads.len()
    }

    /// Terminator set through [`Transport::set_terminator`], if any.
    pub fn terminator(&self) -> Option<String> {
        self.state.lock().terminator.clone()
    }

    /// Forget logged writes and read attempts.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.read_attempts = 0;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(kind) = state.fail_next_write.take() {
            return Err(io::Error::new(kind, "injected write failure"));
        }
        let mut framed = bytes.to_vec();
        if let Some(terminator) = &state.terminator {
            framed.extend_from_slice(terminator.as_bytes());
        }
        state.writes.push(Bytes::from(framed));
        Ok(())
    }

    async fn read_raw(&mut self) -> io::Result<Bytes> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.read_attempts += 1;
        if let Some(kind) = state.fail_next_read.take() {
            return Err(io::Error::new(kind, "injected read failure"));
        }
        let Some(frames) = state.frames.as_mut() else {
            return Ok(state.reads.pop_front().unwrap_or_default());
        };
        loop {
            if let Some(frame) = frames.next_frame() {
                return Ok(frame);
            }
            match state.reads.pop_front() {
                Some(chunk) if !chunk.is_empty() => frames.extend(&chunk),
                // Line went quiet: hand up whatever is left
                _ => return Ok(frames.take_remaining()),
            }
        }
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.state.lock().terminator = Some(terminator.to_string());
    }
}
