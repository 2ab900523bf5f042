//! APT packet framing.
//!
//! Every APT message starts with a fixed 6-byte header. Short messages carry
//! two parameter bytes in the header; long messages replace them with a data
//! length and set the high bit of the destination byte:
//!
//! ```text
//! ┌──────────┬─────────┬─────────┬─────────────┬────────┐
//! │ Msg ID   │ Param 1 │ Param 2 │ Destination │ Source │
//! │ uint16 LE│ 1 byte  │ 1 byte  │ 1 byte      │ 1 byte │
//! └──────────┴─────────┴─────────┴─────────────┴────────┘
//!
//! ┌──────────┬────────────┬─────────────┬────────┬──────────────┐
//! │ Msg ID   │ Data len   │ Dest | 0x80 │ Source │ Data ...     │
//! │ uint16 LE│ uint16 LE  │ 1 byte      │ 1 byte │ len bytes    │
//! └──────────┴────────────┴─────────────┴────────┴──────────────┘
//! ```
//!
//! The payload is opaque to this module.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AppResult, MotionError};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Destination bit marking that a data section follows the header.
pub const DATA_FLAG: u8 = 0x80;

/// One APT protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptPacket {
    message_id: u16,
    param1: u8,
    param2: u8,
    destination: u8,
    source: u8,
    data: Option<Bytes>,
}

impl AptPacket {
    /// Create a packet, validating that it can be framed.
    ///
    /// Parameter bytes are ignored on the wire when `data` is present, so they
    /// are stored as zero in that case.
    pub fn new(
        message_id: u16,
        param1: u8,
        param2: u8,
        destination: u8,
        source: u8,
        data: Option<Bytes>,
    ) -> AppResult<Self> {
        if destination & DATA_FLAG != 0 {
            return Err(MotionError::MalformedPacket(format!(
                "destination {:#04x} collides with the data flag",
                destination
            )));
        }

        let (param1, param2) = match &data {
            Some(payload) => {
                if payload.len() > usize::from(u16::MAX) {
                    return Err(MotionError::MalformedPacket(format!(
                        "data section of {} bytes exceeds {}",
                        payload.len(),
                        u16::MAX
                    )));
                }
                (0, 0)
            }
            None => (param1, param2),
        };

        Ok(Self {
            message_id,
            param1,
            param2,
            destination,
            source,
            data,
        })
    }

    /// Header-only packet.
    pub fn short(
        message_id: u16,
        param1: u8,
        param2: u8,
        destination: u8,
        source: u8,
    ) -> AppResult<Self> {
        Self::new(message_id, param1, param2, destination, source, None)
    }

    /// Packet with a data section.
    pub fn with_data(
        message_id: u16,
        destination: u8,
        source: u8,
        data: impl Into<Bytes>,
    ) -> AppResult<Self> {
        Self::new(message_id, 0, 0, destination, source, Some(data.into()))
    }

    /// Message identifier.
    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    /// First header parameter; zero on long packets.
    pub fn param1(&self) -> u8 {
        self.param1
    }

    /// Second header parameter; zero on long packets.
    pub fn param2(&self) -> u8 {
        self.param2
    }

    /// Destination address, without the data flag.
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Source address.
    pub fn source(&self) -> u8 {
        self.source
    }

    /// Data section, if this is a long packet.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Total framed length in bytes.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.data.as_ref().map_or(0, Bytes::len)
    }

    /// Encode to canonical wire bytes.
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u16_le(self.message_id);
        match &self.data {
            Some(payload) => {
                // Length fits: checked in `new`.
                buf.put_u16_le(payload.len() as u16);
                buf.put_u8(self.destination | DATA_FLAG);
                buf.put_u8(self.source);
                buf.put_slice(payload);
            }
            None => {
                buf.put_u8(self.param1);
                buf.put_u8(self.param2);
                buf.put_u8(self.destination);
                buf.put_u8(self.source);
            }
        }
        buf.freeze()
    }

    /// Decode exactly one packet from `raw`.
    pub fn unpack(raw: &[u8]) -> AppResult<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(MotionError::MalformedPacket(format!(
                "{} bytes is shorter than the {}-byte header",
                raw.len(),
                HEADER_SIZE
            )));
        }

        let mut buf = raw;
        let message_id = buf.get_u16_le();
        let param1 = buf.get_u8();
        let param2 = buf.get_u8();
        let destination = buf.get_u8();
        let source = buf.get_u8();

        if destination & DATA_FLAG == 0 {
            if buf.has_remaining() {
                return Err(MotionError::MalformedPacket(format!(
                    "{} trailing bytes after header-only packet {:#06x}",
                    buf.remaining(),
                    message_id
                )));
            }
            return Self::short(message_id, param1, param2, destination, source);
        }

        let data_len = usize::from(u16::from_le_bytes([param1, param2]));
        if buf.remaining() != data_len {
            return Err(MotionError::MalformedPacket(format!(
                "packet {:#06x} declares {} data bytes but carries {}",
                message_id,
                data_len,
                buf.remaining()
            )));
        }

        Self::with_data(
            message_id,
            destination & !DATA_FLAG,
            source,
            Bytes::copy_from_slice(buf),
        )
    }
}
