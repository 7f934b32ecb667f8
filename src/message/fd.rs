use super::{check_id, ensure_len, Codec, Generation, MessageType, Timestamp};
use crate::error::{CanError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Maximum payload of a CAN FD frame
pub const MAX_DATA_LEN: usize = 64;
/// Highest CAN FD data length code
pub const MAX_DLC: u8 = 15;

/// Payload length for each data length code 0..=15.
const DLC_TO_LEN: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Payload length encoded by a DLC, `None` above 15.
pub fn dlc_to_len(dlc: u8) -> Option<usize> {
    DLC_TO_LEN.get(usize::from(dlc)).map(|len| usize::from(*len))
}

/// DLC encoding exactly `len` bytes, `None` when no DLC lands on it.
pub fn len_to_dlc(len: usize) -> Option<u8> {
    match len {
        0..=8 => Some(len as u8),
        12 => Some(9),
        16 => Some(10),
        20 => Some(11),
        24 => Some(12),
        32 => Some(13),
        48 => Some(14),
        64 => Some(15),
        _ => None,
    }
}

/// CAN FD message record.
///
/// Wire layout, 72 bytes:
/// ```text
/// offset  0  ID       u32
/// offset  4  MSGTYPE  u8
/// offset  5  DLC      u8   (0..15)
/// offset  6  DATA     [u8; 64]
/// offset 70  padding  [u8; 2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdMessage {
    pub id: u32,
    pub msg_type: MessageType,
    pub dlc: u8,
    pub data: [u8; MAX_DATA_LEN],
}

impl FdMessage {
    /// Creates a frame whose payload length must land on a DLC.
    pub fn new(id: u32, msg_type: MessageType, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_DATA_LEN {
            return Err(CanError::PayloadTooLong {
                len: data.len(),
                max: MAX_DATA_LEN,
            });
        }
        let dlc = len_to_dlc(data.len()).ok_or(CanError::InvalidFdLength(data.len()))?;
        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        let msg = Self {
            id,
            msg_type,
            dlc,
            data: buf,
        };
        msg.validate()?;
        Ok(msg)
    }

    /// FD frame with bit rate switching, standard or extended by `extended`.
    pub fn fd(id: u32, extended: bool, data: &[u8]) -> Result<Self> {
        let mut msg_type = MessageType::FD | MessageType::BRS;
        if extended {
            msg_type |= MessageType::EXTENDED;
        }
        Self::new(id, msg_type, data)
    }

    pub fn is_extended(&self) -> bool {
        self.msg_type.contains(MessageType::EXTENDED)
    }

    pub fn is_fd(&self) -> bool {
        self.msg_type.contains(MessageType::FD)
    }

    /// Payload length encoded by the DLC; 0 for an out-of-range DLC.
    pub fn len(&self) -> usize {
        dlc_to_len(self.dlc).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload bytes up to the declared length.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len()]
    }
}

impl Codec for FdMessage {
    type Timestamp = Timestamp;

    const GENERATION: Generation = Generation::Fd;
    const WIRE_SIZE: usize = 72;
    const TIMESTAMP_SIZE: usize = Timestamp::WIRE_SIZE;

    fn validate(&self) -> Result<()> {
        check_id(self.id, self.is_extended())?;
        if self.dlc > MAX_DLC {
            return Err(CanError::DlcOutOfRange {
                dlc: u16::from(self.dlc),
                max: u16::from(MAX_DLC),
            });
        }
        if !self.is_fd() {
            // A classic frame sent through an FD channel
            if self.msg_type.intersects(MessageType::BRS | MessageType::ESI) {
                return Err(CanError::MessageType {
                    bits: u16::from(self.msg_type.bits()),
                    generation: Generation::Fd,
                });
            }
            if self.dlc > 8 {
                return Err(CanError::DlcOutOfRange {
                    dlc: u16::from(self.dlc),
                    max: 8,
                });
            }
        } else if self.msg_type.contains(MessageType::RTR) {
            return Err(CanError::MessageType {
                bits: u16::from(self.msg_type.bits()),
                generation: Generation::Fd,
            });
        }
        Ok(())
    }

    fn encode(&self) -> Result<BytesMut> {
        self.validate()?;
        let mut dst = BytesMut::with_capacity(Self::WIRE_SIZE);
        dst.put_u32_le(self.id);
        dst.put_u8(self.msg_type.bits());
        dst.put_u8(self.dlc);
        dst.put_slice(&self.data);
        dst.put_bytes(0, 2);
        Ok(dst)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        let id = src.get_u32_le();
        let msg_type = MessageType::from_bits_retain(src.get_u8());
        let dlc = src.get_u8();
        let len = dlc_to_len(dlc).ok_or(CanError::DlcOutOfRange {
            dlc: u16::from(dlc),
            max: u16::from(MAX_DLC),
        })?;
        let mut data = [0u8; MAX_DATA_LEN];
        src.copy_to_slice(&mut data);
        data[len..].fill(0);
        Ok(Self {
            id,
            msg_type,
            dlc,
            data,
        })
    }

    fn decode_timestamp(src: &[u8]) -> Result<Timestamp> {
        Timestamp::decode(src)
    }
}
