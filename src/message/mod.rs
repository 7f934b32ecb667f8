//! Message codecs for the three frame generations.
//!
//! Each generation has its own record shape on the driver boundary:
//! - Classic CAN: 8 data bytes, linear DLC 0..8
//! - CAN FD: 64 data bytes, non-linear DLC 0..15
//! - CAN XL: 2048 data bytes, DLC 0..2047 plus the XL header fields
//!
//! Classic and FD share the millisecond/overflow/microsecond [`Timestamp`];
//! XL uses the flat 64-bit [`TimestampXl`]. The two timestamp types have no
//! conversion between them.
//!
//! Records are written with explicit little-endian offsets that match the
//! C layout of the driver structures, including alignment padding.

pub mod classic;
pub mod fd;
pub mod xl;

pub use classic::{CanMessage, Timestamp};
pub use fd::{dlc_to_len, len_to_dlc, FdMessage};
pub use xl::{TimestampXl, XlMessage};

use crate::error::{CanError, Result};
use bitflags::bitflags;
use bytes::BytesMut;

/// Maximum value for a standard (11-bit) CAN ID
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Maximum value for an extended (29-bit) CAN ID
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Maximum value for a CAN XL priority ID
pub const MAX_PRIORITY_ID: u32 = 0x7FF;

/// Frame generation a channel was initialized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Classic,
    Fd,
    Xl,
}

bitflags! {
    /// Frame type flags of classic and FD records
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageType: u8 {
        const STANDARD = 0x00;
        const RTR = 0x01;
        const EXTENDED = 0x02;
        const FD = 0x04;
        const BRS = 0x08;
        const ESI = 0x10;
        const ECHO = 0x20;
        const ERRFRAME = 0x40;
        const STATUS = 0x80;
    }
}

bitflags! {
    /// Frame type flags of XL records
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageTypeXl: u16 {
        const STANDARD = 0x000;
        const RTR = 0x001;
        const EXTENDED = 0x002;
        const FD = 0x004;
        const BRS = 0x008;
        const ESI = 0x010;
        const ECHO = 0x020;
        const ERRFRAME = 0x040;
        const STATUS = 0x080;
        const XL = 0x100;
        const PROTOCOL_EXCEPTION = 0x200;
        const ERROR_NOTIFICATION = 0x400;
    }
}

impl From<MessageType> for MessageTypeXl {
    fn from(msg_type: MessageType) -> Self {
        MessageTypeXl::from_bits_retain(u16::from(msg_type.bits()))
    }
}

/// A message of any generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Classic(CanMessage),
    Fd(FdMessage),
    Xl(XlMessage),
}

impl Message {
    pub fn generation(&self) -> Generation {
        match self {
            Message::Classic(_) => Generation::Classic,
            Message::Fd(_) => Generation::Fd,
            Message::Xl(_) => Generation::Xl,
        }
    }

    /// Payload bytes up to the declared length.
    pub fn data(&self) -> &[u8] {
        match self {
            Message::Classic(msg) => msg.data(),
            Message::Fd(msg) => msg.data(),
            Message::Xl(msg) => msg.data(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Message::Classic(msg) => msg.validate(),
            Message::Fd(msg) => msg.validate(),
            Message::Xl(msg) => msg.validate(),
        }
    }
}

/// A received message together with its generation's timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Classic(CanMessage, Timestamp),
    Fd(FdMessage, Timestamp),
    Xl(XlMessage, TimestampXl),
}

impl Received {
    pub fn generation(&self) -> Generation {
        match self {
            Received::Classic(..) => Generation::Classic,
            Received::Fd(..) => Generation::Fd,
            Received::Xl(..) => Generation::Xl,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Received::Classic(msg, _) => Message::Classic(msg),
            Received::Fd(msg, _) => Message::Fd(msg),
            Received::Xl(msg, _) => Message::Xl(msg),
        }
    }
}

/// Wire codec of one generation's message and timestamp records.
pub trait Codec: Sized {
    type Timestamp;

    const GENERATION: Generation;
    /// Size of the message record in bytes
    const WIRE_SIZE: usize;
    /// Size of the timestamp record in bytes
    const TIMESTAMP_SIZE: usize;

    fn validate(&self) -> Result<()>;

    /// Validates and writes the message record, exactly `WIRE_SIZE` bytes.
    fn encode(&self) -> Result<BytesMut>;

    fn decode(src: &[u8]) -> Result<Self>;

    fn decode_timestamp(src: &[u8]) -> Result<Self::Timestamp>;

    /// Zeroed buffer for a read: message record followed by its timestamp.
    fn read_buffer() -> BytesMut {
        BytesMut::zeroed(Self::WIRE_SIZE + Self::TIMESTAMP_SIZE)
    }

    /// Splits a filled read buffer into message and timestamp.
    fn decode_read(src: &[u8]) -> Result<(Self, Self::Timestamp)> {
        let need = Self::WIRE_SIZE + Self::TIMESTAMP_SIZE;
        if src.len() < need {
            return Err(CanError::BufferTooShort {
                need,
                got: src.len(),
            });
        }
        let (msg, ts) = src.split_at(Self::WIRE_SIZE);
        Ok((Self::decode(msg)?, Self::decode_timestamp(ts)?))
    }
}

pub(crate) fn ensure_len(src: &[u8], need: usize) -> Result<()> {
    if src.len() < need {
        return Err(CanError::BufferTooShort {
            need,
            got: src.len(),
        });
    }
    Ok(())
}

/// Checks a classic/FD identifier against the width selected by `extended`.
pub(crate) fn check_id(id: u32, extended: bool) -> Result<()> {
    let max = if extended {
        MAX_EXTENDED_ID
    } else {
        MAX_STANDARD_ID
    };
    if id > max {
        return Err(CanError::IdOutOfRange { id, max });
    }
    Ok(())
}
