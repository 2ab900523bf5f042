//! Serial transport for APT controllers.
//!
//! Thorlabs APT controllers enumerate as FTDI USB-serial devices:
//! - 115200 baud, 8 data bits, no parity, 1 stop bit
//! - RTS/CTS hardware flow control
//!
//! A read returns one APT frame. Bytes are accumulated until the frame at the
//! front is complete, so a packet split across several USB transfers comes
//! back whole and packets that arrive back to back come back one per read.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

use crate::config::SerialSettings;
use crate::error::{AppResult, MotionError};
use crate::hardware::transport::Transport;
use crate::protocol::FrameBuffer;

/// Gap after which an incomplete frame is handed up as is.
const INTER_BYTE_GAP: Duration = Duration::from_millis(20);

/// [`Transport`] over a `tokio-serial` stream.
pub struct SerialTransport {
    port: SerialStream,
    port_name: String,
    read_timeout: Duration,
    terminator: Vec<u8>,
    frames: FrameBuffer,
}

impl SerialTransport {
    /// Open the port described by `settings`.
    ///
    /// # Errors
    /// Returns `MotionError::Serial` if the port cannot be opened.
    pub fn open(settings: &SerialSettings) -> AppResult<Self> {
        let port = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::Hardware)
            .open_native_async()
            .map_err(|e| {
                MotionError::Serial(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    settings.port, settings.baud_rate, e
                ))
            })?;

        debug!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            "Serial port opened"
        );

        Ok(Self {
            port,
            port_name: settings.port.clone(),
            read_timeout: settings.read_timeout,
            terminator: Vec::new(),
            frames: FrameBuffer::new(),
        })
    }

    /// Name the port was opened with.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes).await?;
        if !self.terminator.is_empty() {
            self.port.write_all(&self.terminator).await?;
        }
        self.port.flush().await
    }

    async fn read_raw(&mut self) -> io::Result<Bytes> {
        if let Some(frame) = self.frames.next_frame() {
            return Ok(frame);
        }

        let mut buf = [0u8; 256];
        match tokio::time::timeout(self.read_timeout, self.port.read(&mut buf)).await {
            Ok(Ok(n)) => self.frames.extend(&buf[..n]),
            Ok(Err(e)) => return Err(e),
            // Nothing arrived in time
            Err(_) => return Ok(self.frames.take_remaining()),
        }

        // Keep reading until the front frame is complete or the line goes quiet
        loop {
            if let Some(frame) = self.frames.next_frame() {
                trace!(buffered = self.frames.len(), "Frame received");
                return Ok(frame);
            }
            match tokio::time::timeout(INTER_BYTE_GAP, self.port.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => self.frames.extend(&buf[..n]),
                Ok(Ok(_)) | Err(_) => return Ok(self.frames.take_remaining()),
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.as_bytes().to_vec();
    }
}
