use super::fd::{self, dlc_to_len, len_to_dlc};
use super::{
    check_id, ensure_len, CanMessage, Codec, FdMessage, Generation, MessageTypeXl,
    MAX_PRIORITY_ID,
};
use crate::error::{CanError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Maximum payload of a CAN XL frame
pub const MAX_DATA_LEN: usize = 2048;
/// Highest CAN XL data length code; an XL frame carries `DLC + 1` bytes
pub const MAX_DLC: u16 = 2047;

/// CAN XL message record.
///
/// An XL channel also carries classic and FD frames in this record. Those
/// have no [`MessageTypeXl::XL`] flag, use `pid` as their 11/29-bit ID and
/// encode their DLC with the CAN FD table; the XL header fields are ignored.
///
/// Wire layout, 2068 bytes:
/// ```text
/// offset  0  PID      u32
/// offset  4  VCID     u8
/// offset  5  padding  u8
/// offset  6  MSGTYPE  u16
/// offset  8  DLC      u16  (0..2047)
/// offset 10  SDT      u8
/// offset 11  padding  u8
/// offset 12  AF       u32
/// offset 16  RRS      u8
/// offset 17  SEC      u8
/// offset 18  DATA     [u8; 2048]
/// offset 2066 padding [u8; 2]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XlMessage {
    /// Priority ID (XL) or CAN ID (classic/FD)
    pub pid: u32,
    /// Virtual CAN network ID
    pub vcid: u8,
    pub msg_type: MessageTypeXl,
    /// Service data unit type
    pub sdt: u8,
    /// Acceptance field
    pub af: u32,
    /// Remote request substitution
    pub rrs: bool,
    /// Simple extended content
    pub sec: bool,
    /// Payload, exactly the declared length
    pub data: Vec<u8>,
}

impl XlMessage {
    /// XL frame with default header fields.
    pub fn new(pid: u32, data: &[u8]) -> Result<Self> {
        let msg = Self {
            pid,
            vcid: 0,
            msg_type: MessageTypeXl::XL,
            sdt: 0,
            af: 0,
            rrs: false,
            sec: false,
            data: data.to_vec(),
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn with_header(mut self, vcid: u8, sdt: u8, af: u32) -> Self {
        self.vcid = vcid;
        self.sdt = sdt;
        self.af = af;
        self
    }

    pub fn is_xl(&self) -> bool {
        self.msg_type.contains(MessageTypeXl::XL)
    }

    pub fn is_extended(&self) -> bool {
        self.msg_type.contains(MessageTypeXl::EXTENDED)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Data length code for the wire, `None` if the length has no encoding.
    pub fn dlc(&self) -> Option<u16> {
        if self.is_xl() {
            match self.data.len() {
                1..=MAX_DATA_LEN => Some((self.data.len() - 1) as u16),
                _ => None,
            }
        } else {
            len_to_dlc(self.data.len()).map(u16::from)
        }
    }

    fn type_error(&self) -> CanError {
        CanError::MessageType {
            bits: self.msg_type.bits(),
            generation: Generation::Xl,
        }
    }
}

impl From<&CanMessage> for XlMessage {
    fn from(msg: &CanMessage) -> Self {
        Self {
            pid: msg.id,
            vcid: 0,
            msg_type: MessageTypeXl::from(msg.msg_type),
            sdt: 0,
            af: 0,
            rrs: false,
            sec: false,
            data: msg.data().to_vec(),
        }
    }
}

impl From<&FdMessage> for XlMessage {
    fn from(msg: &FdMessage) -> Self {
        Self {
            pid: msg.id,
            vcid: 0,
            msg_type: MessageTypeXl::from(msg.msg_type),
            sdt: 0,
            af: 0,
            rrs: false,
            sec: false,
            data: msg.data().to_vec(),
        }
    }
}

impl Codec for XlMessage {
    type Timestamp = TimestampXl;

    const GENERATION: Generation = Generation::Xl;
    const WIRE_SIZE: usize = 2068;
    const TIMESTAMP_SIZE: usize = TimestampXl::WIRE_SIZE;

    fn validate(&self) -> Result<()> {
        if self.is_xl() {
            let classic_only = MessageTypeXl::RTR
                | MessageTypeXl::EXTENDED
                | MessageTypeXl::FD
                | MessageTypeXl::BRS
                | MessageTypeXl::ESI;
            if self.msg_type.intersects(classic_only) {
                return Err(self.type_error());
            }
            if self.pid > MAX_PRIORITY_ID {
                return Err(CanError::IdOutOfRange {
                    id: self.pid,
                    max: MAX_PRIORITY_ID,
                });
            }
            if self.data.is_empty() {
                return Err(CanError::EmptyXlPayload);
            }
            if self.data.len() > MAX_DATA_LEN {
                return Err(CanError::PayloadTooLong {
                    len: self.data.len(),
                    max: MAX_DATA_LEN,
                });
            }
            return Ok(());
        }

        check_id(self.pid, self.is_extended())?;
        let fd_frame = self.msg_type.contains(MessageTypeXl::FD);
        let max = if fd_frame { fd::MAX_DATA_LEN } else { 8 };
        if self.data.len() > max {
            return Err(CanError::PayloadTooLong {
                len: self.data.len(),
                max,
            });
        }
        if len_to_dlc(self.data.len()).is_none() {
            return Err(CanError::InvalidFdLength(self.data.len()));
        }
        if !fd_frame && self.msg_type.intersects(MessageTypeXl::BRS | MessageTypeXl::ESI) {
            return Err(self.type_error());
        }
        Ok(())
    }

    fn encode(&self) -> Result<BytesMut> {
        self.validate()?;
        let dlc = self.dlc().ok_or(CanError::InvalidFdLength(self.data.len()))?;
        let mut dst = BytesMut::with_capacity(Self::WIRE_SIZE);
        dst.put_u32_le(self.pid);
        dst.put_u8(self.vcid);
        dst.put_u8(0);
        dst.put_u16_le(self.msg_type.bits());
        dst.put_u16_le(dlc);
        dst.put_u8(self.sdt);
        dst.put_u8(0);
        dst.put_u32_le(self.af);
        dst.put_u8(u8::from(self.rrs));
        dst.put_u8(u8::from(self.sec));
        dst.put_slice(&self.data);
        dst.put_bytes(0, MAX_DATA_LEN - self.data.len() + 2);
        Ok(dst)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        let pid = src.get_u32_le();
        let vcid = src.get_u8();
        src.advance(1);
        let msg_type = MessageTypeXl::from_bits_retain(src.get_u16_le());
        let dlc = src.get_u16_le();
        let sdt = src.get_u8();
        src.advance(1);
        let af = src.get_u32_le();
        let rrs = src.get_u8() != 0;
        let sec = src.get_u8() != 0;

        let len = if msg_type.contains(MessageTypeXl::XL) {
            if dlc > MAX_DLC {
                return Err(CanError::DlcOutOfRange {
                    dlc,
                    max: MAX_DLC,
                });
            }
            usize::from(dlc) + 1
        } else {
            u8::try_from(dlc)
                .ok()
                .and_then(dlc_to_len)
                .ok_or(CanError::DlcOutOfRange {
                    dlc,
                    max: u16::from(fd::MAX_DLC),
                })?
        };

        Ok(Self {
            pid,
            vcid,
            msg_type,
            sdt,
            af,
            rrs,
            sec,
            data: src[..len].to_vec(),
        })
    }

    fn decode_timestamp(src: &[u8]) -> Result<TimestampXl> {
        TimestampXl::decode(src)
    }
}

/// Receive timestamp of XL messages: a flat microsecond counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimestampXl(pub u64);

impl TimestampXl {
    pub const WIRE_SIZE: usize = 8;

    pub fn micros(self) -> u64 {
        self.0
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.0);
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        Ok(Self(src.get_u64_le()))
    }
}
