//! Byte-stream transport used by the packet engine.

use async_trait::async_trait;
use bytes::Bytes;

/// Raw byte-stream access to an instrument.
///
/// Implementations send exactly the bytes they are given and perform a single
/// bounded read attempt per `read_raw` call, returning an empty buffer when
/// nothing arrived in time.
#[async_trait]
pub trait Transport: Send {
    /// Write `bytes` verbatim; no terminator is appended beyond the configured one.
    async fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// One read attempt. Empty means nothing was available.
    ///
    /// Stream transports return at most one frame per call and keep any
    /// surplus bytes for the next call.
    async fn read_raw(&mut self) -> std::io::Result<Bytes>;

    /// Line terminator appended to writes. APT framing is length-delimited, so
    /// the engine sets this to the empty string.
    fn set_terminator(&mut self, terminator: &str);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).write_raw(bytes).await
    }

    async fn read_raw(&mut self) -> std::io::Result<Bytes> {
        (**self).read_raw().await
    }

    fn set_terminator(&mut self, terminator: &str) {
        (**self).set_terminator(terminator)
    }
}
