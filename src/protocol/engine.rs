//! APT request/response engine.
//!
//! `AptEngine` owns a [`Transport`] exclusively and exchanges [`AptPacket`]s
//! over it. Payloads are never interpreted; replies are matched to requests
//! by message identifier only.
//!
//! # Query loop
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │ AwaitingResponse             │
//!            │  write request, read once    │◄──┐
//!            └──────────────┬───────────────┘   │ empty read,
//!                           │                   │ budget left
//!     reply / Inherit / budget exhausted        │ (sleep poll_interval)
//!                           ▼                   │
//!                         Done ─────────────────┘
//! ```
//!
//! The request is written again on every iteration. This recovers from a
//! dropped first transmission but means a slow instrument can receive the
//! same command several times: only use a bounded timeout with commands that
//! are safe to repeat.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::ProtocolSettings;
use crate::error::{AppResult, MotionError};
use crate::hardware::Transport;
use crate::protocol::clock::{Clock, TokioClock};
use crate::protocol::packet::AptPacket;
use crate::protocol::timeout::QueryTimeout;

/// Packet protocol engine over a byte-stream transport.
pub struct AptEngine<T, C = TokioClock> {
    transport: T,
    clock: C,
    settings: ProtocolSettings,
}

impl<T: Transport> AptEngine<T, TokioClock> {
    /// Engine with default settings and real time.
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, TokioClock::new(), ProtocolSettings::default())
    }

    /// Engine with real time and the given settings.
    pub fn with_settings(transport: T, settings: ProtocolSettings) -> Self {
        Self::with_clock(transport, TokioClock::new(), settings)
    }
}

impl<T: Transport, C: Clock> AptEngine<T, C> {
    /// Engine with an explicit clock.
    ///
    /// The transport's terminator is cleared: APT framing is length-delimited.
    pub fn with_clock(mut transport: T, clock: C, settings: ProtocolSettings) -> Self {
        transport.set_terminator("");
        Self {
            transport,
            clock,
            settings,
        }
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access to the transport, e.g. to inject failures in tests.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Write `packet` without waiting for a reply.
    pub async fn send_packet(&mut self, packet: &AptPacket) -> AppResult<()> {
        debug!(message_id = packet.message_id(), "send packet");
        self.transport.write_raw(&packet.pack()).await?;
        Ok(())
    }

    /// Send `packet` and wait for a reply.
    ///
    /// Returns `Ok(None)` when nothing came back and no reply was expected.
    ///
    /// # Errors
    /// - `MotionError::Io` as soon as the transport fails (never retried)
    /// - `MotionError::NoResponse` when `expect` is set and nothing came back
    /// - `MotionError::MessageIdMismatch` when the reply has another identifier
    /// - `MotionError::MalformedPacket` when the reply cannot be decoded
    pub async fn query_packet(
        &mut self,
        packet: &AptPacket,
        expect: Option<u16>,
        timeout: QueryTimeout,
    ) -> AppResult<Option<AptPacket>> {
        let request = packet.pack();
        let start = self.clock.now();
        let mut attempts: u32 = 0;

        debug!(
            message_id = packet.message_id(),
            expect = ?expect,
            timeout = ?timeout,
            "query packet"
        );

        let response = loop {
            attempts = attempts.saturating_add(1);
            self.transport.write_raw(&request).await?;
            let response = self.transport.read_raw().await?;

            if !response.is_empty() || timeout == QueryTimeout::Inherit {
                break response;
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if timeout.is_exhausted(elapsed) {
                break Bytes::new();
            }

            trace!(attempts, ?elapsed, "no reply yet, re-sending");
            self.clock.sleep(self.settings.poll_interval).await;
        };

        self.resolve(response, expect, attempts)
    }

    fn resolve(
        &self,
        response: Bytes,
        expect: Option<u16>,
        attempts: u32,
    ) -> AppResult<Option<AptPacket>> {
        if response.is_empty() {
            return match expect {
                None => {
                    debug!(attempts, "no reply");
                    Ok(None)
                }
                Some(expected) => {
                    warn!(attempts, expected, "expected reply never arrived");
                    Err(MotionError::NoResponse { expected })
                }
            };
        }

        let reply = AptPacket::unpack(&response)?;
        if let Some(expected) = expect {
            if reply.message_id() != expected {
                warn!(
                    received = reply.message_id(),
                    expected, "reply message ID mismatch"
                );
                return Err(MotionError::MessageIdMismatch {
                    received: reply.message_id(),
                    expected,
                });
            }
        }

        debug!(message_id = reply.message_id(), attempts, "reply received");
        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockTransport;
    use crate::protocol::clock::ManualClock;
    use std::time::Duration;

    const REQ_INFO: u16 = 0x0005;
    const GET_INFO: u16 = 0x0006;

    fn request() -> AptPacket {
        AptPacket::short(REQ_INFO, 0, 0, 0x50, 0x01).unwrap()
    }

    fn reply(message_id: u16) -> AptPacket {
        AptPacket::with_data(message_id, 0x01, 0x50, vec![0u8; 84]).unwrap()
    }

    fn engine(transport: &MockTransport, clock: &ManualClock) -> AptEngine<MockTransport, ManualClock> {
        AptEngine::with_clock(transport.clone(), clock.clone(), ProtocolSettings::default())
    }

    #[tokio::test]
    async fn test_construction_clears_terminator() {
        let transport = MockTransport::new();
        let _engine = AptEngine::new(transport.clone());
        assert_eq!(transport.terminator().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_send_packet_writes_once() {
        let transport = MockTransport::new();
        let mut engine = engine(&transport, &ManualClock::new());

        engine.send_packet(&request()).await.unwrap();

        assert_eq!(transport.writes(), vec![request().pack()]);
        assert_eq!(transport.read_attempts(), 0);
    }

    #[tokio::test]
    async fn test_inherit_reads_once() {
        let transport = MockTransport::new();
        let clock = ManualClock::new();
        let mut engine = engine(&transport, &clock);

        let result = engine
            .query_packet(&request(), None, QueryTimeout::Inherit)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(transport.writes().len(), 1);
        assert_eq!(transport.read_attempts(), 1);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_resends_until_reply() {
        let transport = MockTransport::new();
        transport.queue_silence(3);
        transport.queue_packet(&reply(GET_INFO));
        let mut engine = engine(&transport, &ManualClock::new());

        let result = engine
            .query_packet(&request(), Some(GET_INFO), QueryTimeout::Indefinite)
            .await
            .unwrap();

        assert_eq!(result, Some(reply(GET_INFO)));
        assert_eq!(transport.written_packets(), vec![request(); 4]);
    }

    #[tokio::test]
    async fn test_timeout_bounds() {
        let transport = MockTransport::new();
        let clock = ManualClock::new();
        let mut engine = engine(&transport, &clock);
        let limit = Duration::from_millis(100);

        let result = engine
            .query_packet(&request(), None, QueryTimeout::After(limit))
            .await
            .unwrap();

        assert!(result.is_none());
        let poll = ProtocolSettings::default().poll_interval;
        assert!(clock.now() > limit);
        assert!(clock.now() <= limit + poll);
    }

    #[tokio::test]
    async fn test_missing_expected_reply() {
        let transport = MockTransport::new();
        let mut engine = engine(&transport, &ManualClock::new());

        let err = engine
            .query_packet(
                &request(),
                Some(GET_INFO),
                QueryTimeout::After(Duration::from_millis(30)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MotionError::NoResponse { expected: GET_INFO }));
        assert!(err.to_string().contains("0x0006"));
    }

    #[tokio::test]
    async fn test_mismatched_reply() {
        let transport = MockTransport::new();
        transport.queue_packet(&reply(0x0464));
        let mut engine = engine(&transport, &ManualClock::new());

        let err = engine
            .query_packet(&request(), Some(GET_INFO), QueryTimeout::Inherit)
            .await
            .unwrap_err();

        match err {
            MotionError::MessageIdMismatch { received, expected } => {
                assert_eq!(received, 0x0464);
                assert_eq!(expected, GET_INFO);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unchecked_reply_is_returned() {
        let transport = MockTransport::new();
        transport.queue_packet(&reply(0x0464));
        let mut engine = engine(&transport, &ManualClock::new());

        let result = engine
            .query_packet(&request(), None, QueryTimeout::Inherit)
            .await
            .unwrap();

        assert_eq!(result.map(|p| p.message_id()), Some(0x0464));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let transport = MockTransport::new();
        transport.fail_next_read(std::io::ErrorKind::BrokenPipe);
        let mut engine = engine(&transport, &ManualClock::new());

        let err = engine
            .query_packet(&request(), Some(GET_INFO), QueryTimeout::Indefinite)
            .await
            .unwrap_err();

        match err {
            MotionError::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let transport = MockTransport::new();
        transport.queue_bytes(vec![0xFFu8, 0xFF]);
        let mut engine = engine(&transport, &ManualClock::new());

        let err = engine
            .query_packet(&request(), None, QueryTimeout::Inherit)
            .await
            .unwrap_err();

        assert!(matches!(err, MotionError::MalformedPacket(_)));
    }
}
