use super::{check_id, ensure_len, Codec, Generation, MessageType};
use crate::error::{CanError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Maximum payload of a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// Classic CAN message record.
///
/// Wire layout, 16 bytes:
/// ```text
/// offset  0  ID       u32
/// offset  4  MSGTYPE  u8
/// offset  5  LEN      u8   (0..8)
/// offset  6  DATA     [u8; 8]
/// offset 14  padding  [u8; 2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanMessage {
    pub id: u32,
    pub msg_type: MessageType,
    pub len: u8,
    pub data: [u8; MAX_DATA_LEN],
}

impl CanMessage {
    /// Creates a data frame, standard or extended according to `msg_type`.
    pub fn new(id: u32, msg_type: MessageType, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_DATA_LEN {
            return Err(CanError::PayloadTooLong {
                len: data.len(),
                max: MAX_DATA_LEN,
            });
        }
        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        let msg = Self {
            id,
            msg_type,
            len: data.len() as u8,
            data: buf,
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn standard(id: u32, data: &[u8]) -> Result<Self> {
        Self::new(id, MessageType::STANDARD, data)
    }

    pub fn extended(id: u32, data: &[u8]) -> Result<Self> {
        Self::new(id, MessageType::EXTENDED, data)
    }

    /// Remote transmission request for `len` bytes.
    pub fn remote(id: u32, extended: bool, len: u8) -> Result<Self> {
        let mut msg_type = MessageType::RTR;
        if extended {
            msg_type |= MessageType::EXTENDED;
        }
        let msg = Self {
            id,
            msg_type,
            len,
            data: [0; MAX_DATA_LEN],
        };
        msg.validate()?;
        Ok(msg)
    }

    pub fn is_extended(&self) -> bool {
        self.msg_type.contains(MessageType::EXTENDED)
    }

    pub fn is_remote(&self) -> bool {
        self.msg_type.contains(MessageType::RTR)
    }

    /// Payload bytes up to the declared length.
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len).min(MAX_DATA_LEN)]
    }
}

impl Codec for CanMessage {
    type Timestamp = Timestamp;

    const GENERATION: Generation = Generation::Classic;
    const WIRE_SIZE: usize = 16;
    const TIMESTAMP_SIZE: usize = Timestamp::WIRE_SIZE;

    fn validate(&self) -> Result<()> {
        check_id(self.id, self.is_extended())?;
        if self
            .msg_type
            .intersects(MessageType::FD | MessageType::BRS | MessageType::ESI)
        {
            return Err(CanError::MessageType {
                bits: u16::from(self.msg_type.bits()),
                generation: Generation::Classic,
            });
        }
        if usize::from(self.len) > MAX_DATA_LEN {
            return Err(CanError::DlcOutOfRange {
                dlc: u16::from(self.len),
                max: MAX_DATA_LEN as u16,
            });
        }
        Ok(())
    }

    fn encode(&self) -> Result<BytesMut> {
        self.validate()?;
        let mut dst = BytesMut::with_capacity(Self::WIRE_SIZE);
        dst.put_u32_le(self.id);
        dst.put_u8(self.msg_type.bits());
        dst.put_u8(self.len);
        dst.put_slice(&self.data);
        dst.put_bytes(0, 2);
        Ok(dst)
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        let id = src.get_u32_le();
        let msg_type = MessageType::from_bits_retain(src.get_u8());
        let len = src.get_u8();
        if usize::from(len) > MAX_DATA_LEN {
            return Err(CanError::DlcOutOfRange {
                dlc: u16::from(len),
                max: MAX_DATA_LEN as u16,
            });
        }
        let mut data = [0u8; MAX_DATA_LEN];
        src.copy_to_slice(&mut data);
        // Bytes past LEN are whatever the driver left behind
        data[usize::from(len)..].fill(0);
        Ok(Self {
            id,
            msg_type,
            len,
            data,
        })
    }

    fn decode_timestamp(src: &[u8]) -> Result<Timestamp> {
        Timestamp::decode(src)
    }
}

/// Receive timestamp of classic and FD messages.
///
/// Total microseconds = `micros + 1000 * millis + 1000 * 2^32 * millis_overflow`.
///
/// Wire layout, 8 bytes: `millis u32`, `millis_overflow u16`, `micros u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    /// Milliseconds, 0..2^32-1
    pub millis: u32,
    /// Roll-arounds of `millis`
    pub millis_overflow: u16,
    /// Microseconds, 0..999
    pub micros: u16,
}

impl Timestamp {
    pub const WIRE_SIZE: usize = 8;

    pub fn new(millis: u32, millis_overflow: u16, micros: u16) -> Self {
        Self {
            millis,
            millis_overflow,
            micros,
        }
    }

    /// Elapsed microseconds since the driver's time base.
    pub fn total_micros(&self) -> u64 {
        u64::from(self.micros)
            + 1000 * u64::from(self.millis)
            + 1000 * (1u64 << 32) * u64::from(self.millis_overflow)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.millis);
        dst.put_u16_le(self.millis_overflow);
        dst.put_u16_le(self.micros);
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        Ok(Self {
            millis: src.get_u32_le(),
            millis_overflow: src.get_u16_le(),
            micros: src.get_u16_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let msg = CanMessage::extended(0x1234_5678, &[0xDE, 0xAD, 0xBE]).unwrap();
        let buf = msg.encode().unwrap();
        assert_eq!(buf.len(), CanMessage::WIRE_SIZE);
        assert_eq!(&buf[0..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(buf[4], MessageType::EXTENDED.bits());
        assert_eq!(buf[5], 3);
        assert_eq!(&buf[6..9], &[0xDE, 0xAD, 0xBE]);
        assert_eq!(&buf[9..16], &[0; 7]);
    }

    #[test]
    fn test_decode_ignores_bytes_past_len() {
        let mut raw = [0u8; 16];
        raw[0] = 0x23;
        raw[1] = 0x01;
        raw[5] = 2;
        raw[6..14].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let msg = CanMessage::decode(&raw).unwrap();
        assert_eq!(msg.id, 0x123);
        assert_eq!(msg.data(), &[1, 2]);
        assert_eq!(msg.data, [1, 2, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_rejects_len_above_eight() {
        let mut raw = [0u8; 16];
        raw[5] = 9;
        assert_eq!(
            CanMessage::decode(&raw),
            Err(CanError::DlcOutOfRange { dlc: 9, max: 8 })
        );
    }

    #[test]
    fn test_length_bounds() {
        assert!(CanMessage::standard(0x100, &[0; 8]).is_ok());
        assert_eq!(
            CanMessage::standard(0x100, &[0; 9]),
            Err(CanError::PayloadTooLong { len: 9, max: 8 })
        );

        let mut msg = CanMessage::standard(0x100, &[]).unwrap();
        msg.len = 12;
        assert!(msg.encode().is_err());
    }

    #[test]
    fn test_id_bounds() {
        assert!(CanMessage::standard(0x800, &[]).is_err());
        assert!(CanMessage::extended(0x800, &[]).is_ok());
        assert!(CanMessage::extended(0x2000_0000, &[]).is_err());
    }

    #[test]
    fn test_fd_flags_rejected() {
        let result = CanMessage::new(0x10, MessageType::FD, &[1]);
        assert!(matches!(
            result,
            Err(CanError::MessageType {
                generation: Generation::Classic,
                ..
            })
        ));
    }

    #[test]
    fn test_remote_frame() {
        let msg = CanMessage::remote(0x7DF, false, 8).unwrap();
        assert!(msg.is_remote());
        assert_eq!(msg.len, 8);
        assert!(!msg.is_extended());
    }

    #[test]
    fn test_timestamp_total_micros() {
        let ts = Timestamp::new(5, 1, 500);
        assert_eq!(ts.total_micros(), 500 + 5_000 + 1000 * (1u64 << 32));
        assert_eq!(Timestamp::new(0, 0, 999).total_micros(), 999);
        let max = Timestamp::new(u32::MAX, u16::MAX, 999);
        assert!(max.total_micros() > 0);
    }

    #[test]
    fn test_timestamp_wire_layout() {
        let mut buf = BytesMut::new();
        Timestamp::new(0x0102_0304, 0x0506, 0x0708).encode(&mut buf);
        assert_eq!(&buf[..], &[0x04, 0x03, 0x02, 0x01, 0x06, 0x05, 0x08, 0x07]);
        assert_eq!(
            Timestamp::decode(&buf).unwrap(),
            Timestamp::new(0x0102_0304, 0x0506, 0x0708)
        );
    }
}
