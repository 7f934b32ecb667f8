//! Typed value registry.
//!
//! The driver's get/set entry points take a raw buffer and its length and
//! trust the caller to size it correctly for the parameter. This module
//! owns that decision: every [`ParameterId`] maps to exactly one
//! [`WireShape`] and one [`Access`] direction, both by exhaustive `match`.

use crate::discovery::ChannelInformation;
use crate::error::{CanError, Result};
use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

/// Size of every text parameter buffer, terminator included
pub const TEXT_BUFFER_LEN: usize = 256;

/// Parameter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ParameterId {
    DeviceId = 0x01,
    FiveVoltsPower = 0x02,
    ReceiveEvent = 0x03,
    MessageFilter = 0x04,
    ApiVersion = 0x05,
    ChannelVersion = 0x06,
    BusoffAutoreset = 0x07,
    ListenOnly = 0x08,
    LogLocation = 0x09,
    LogStatus = 0x0A,
    LogConfigure = 0x0B,
    LogText = 0x0C,
    ChannelCondition = 0x0D,
    HardwareName = 0x0E,
    ReceiveStatus = 0x0F,
    ControllerNumber = 0x10,
    TraceLocation = 0x11,
    TraceStatus = 0x12,
    TraceSize = 0x13,
    TraceConfigure = 0x14,
    ChannelIdentifying = 0x15,
    ChannelFeatures = 0x16,
    BitrateAdapting = 0x17,
    BitrateInfoBtr = 0x18,
    BitrateInfoFd = 0x19,
    BusspeedNominal = 0x1A,
    BusspeedFd = 0x1B,
    IpAddress = 0x1C,
    LanServiceStatus = 0x1D,
    AllowStatusFrames = 0x1E,
    AllowRtrFrames = 0x1F,
    AllowErrorFrames = 0x20,
    InterframeDelay = 0x21,
    AcceptanceFilter11Bit = 0x22,
    AcceptanceFilter29Bit = 0x23,
    IoDigitalConfiguration = 0x24,
    IoDigitalValue = 0x25,
    IoDigitalSet = 0x26,
    IoDigitalClear = 0x27,
    IoAnalogValue = 0x28,
    FirmwareVersion = 0x29,
    AttachedChannelsCount = 0x2A,
    AttachedChannels = 0x2B,
    AllowEchoFrames = 0x2C,
    DevicePartNumber = 0x2D,
    HardResetStatus = 0x2E,
    LanChannelDirection = 0x2F,
    DeviceGuid = 0x30,
    BitrateInfoCc = 0x31,
    BitrateInfoXl = 0x32,
    BusspeedXl = 0x33,
}

/// Buffer shape a parameter is marshaled through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireShape {
    /// 4-byte integer
    Integer,
    /// 8-byte bitmask
    Bitmask64,
    /// 256-byte NUL-terminated text
    Text,
    /// Array of channel information records, sized by a prior count read
    ChannelArray,
}

impl WireShape {
    /// Buffer size of the fixed shapes.
    pub fn size(self) -> Option<usize> {
        match self {
            WireShape::Integer => Some(4),
            WireShape::Bitmask64 => Some(8),
            WireShape::Text => Some(TEXT_BUFFER_LEN),
            WireShape::ChannelArray => None,
        }
    }
}

/// Access direction of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

impl ParameterId {
    /// Deprecated name of [`ParameterId::BusspeedFd`]
    pub const BUSSPEED_DATA: ParameterId = ParameterId::BusspeedFd;
    /// Deprecated name of [`ParameterId::BitrateInfoCc`]
    pub const BITRATE_INFO: ParameterId = ParameterId::BitrateInfoCc;

    /// Every identifier, in ascending order.
    pub const ALL: [ParameterId; 51] = [
        ParameterId::DeviceId,
        ParameterId::FiveVoltsPower,
        ParameterId::ReceiveEvent,
        ParameterId::MessageFilter,
        ParameterId::ApiVersion,
        ParameterId::ChannelVersion,
        ParameterId::BusoffAutoreset,
        ParameterId::ListenOnly,
        ParameterId::LogLocation,
        ParameterId::LogStatus,
        ParameterId::LogConfigure,
        ParameterId::LogText,
        ParameterId::ChannelCondition,
        ParameterId::HardwareName,
        ParameterId::ReceiveStatus,
        ParameterId::ControllerNumber,
        ParameterId::TraceLocation,
        ParameterId::TraceStatus,
        ParameterId::TraceSize,
        ParameterId::TraceConfigure,
        ParameterId::ChannelIdentifying,
        ParameterId::ChannelFeatures,
        ParameterId::BitrateAdapting,
        ParameterId::BitrateInfoBtr,
        ParameterId::BitrateInfoFd,
        ParameterId::BusspeedNominal,
        ParameterId::BusspeedFd,
        ParameterId::IpAddress,
        ParameterId::LanServiceStatus,
        ParameterId::AllowStatusFrames,
        ParameterId::AllowRtrFrames,
        ParameterId::AllowErrorFrames,
        ParameterId::InterframeDelay,
        ParameterId::AcceptanceFilter11Bit,
        ParameterId::AcceptanceFilter29Bit,
        ParameterId::IoDigitalConfiguration,
        ParameterId::IoDigitalValue,
        ParameterId::IoDigitalSet,
        ParameterId::IoDigitalClear,
        ParameterId::IoAnalogValue,
        ParameterId::FirmwareVersion,
        ParameterId::AttachedChannelsCount,
        ParameterId::AttachedChannels,
        ParameterId::AllowEchoFrames,
        ParameterId::DevicePartNumber,
        ParameterId::HardResetStatus,
        ParameterId::LanChannelDirection,
        ParameterId::DeviceGuid,
        ParameterId::BitrateInfoCc,
        ParameterId::BitrateInfoXl,
        ParameterId::BusspeedXl,
    ];

    pub fn raw(self) -> u8 {
        self as u8
    }

    pub fn from_raw(value: u8) -> Option<ParameterId> {
        match value {
            0x01..=0x33 => Some(Self::ALL[usize::from(value) - 1]),
            _ => None,
        }
    }

    pub fn shape(self) -> WireShape {
        use ParameterId::*;
        match self {
            ApiVersion | HardwareName | ChannelVersion | LogLocation | LogText
            | TraceLocation | BitrateInfoCc | BitrateInfoFd | BitrateInfoXl | IpAddress
            | FirmwareVersion | DevicePartNumber | DeviceGuid => WireShape::Text,
            AcceptanceFilter11Bit | AcceptanceFilter29Bit => WireShape::Bitmask64,
            AttachedChannels => WireShape::ChannelArray,
            DeviceId | FiveVoltsPower | ReceiveEvent | MessageFilter | BusoffAutoreset
            | ListenOnly | LogStatus | LogConfigure | ChannelCondition | ReceiveStatus
            | ControllerNumber | TraceStatus | TraceSize | TraceConfigure
            | ChannelIdentifying | ChannelFeatures | BitrateAdapting | BitrateInfoBtr
            | BusspeedNominal | BusspeedFd | LanServiceStatus | AllowStatusFrames
            | AllowRtrFrames | AllowErrorFrames | InterframeDelay | IoDigitalConfiguration
            | IoDigitalValue | IoDigitalSet | IoDigitalClear | IoAnalogValue
            | AttachedChannelsCount | AllowEchoFrames | HardResetStatus
            | LanChannelDirection | BusspeedXl => WireShape::Integer,
        }
    }

    pub fn access(self) -> Access {
        use ParameterId::*;
        match self {
            ApiVersion | ChannelVersion | ChannelCondition | HardwareName | ChannelFeatures
            | BitrateInfoBtr | BitrateInfoFd | BusspeedNominal | BusspeedFd | IpAddress
            | LanServiceStatus | IoAnalogValue | FirmwareVersion | AttachedChannelsCount
            | AttachedChannels | DevicePartNumber | LanChannelDirection | DeviceGuid
            | BitrateInfoCc | BitrateInfoXl | BusspeedXl => Access::ReadOnly,
            LogText | IoDigitalSet | IoDigitalClear => Access::WriteOnly,
            DeviceId | FiveVoltsPower | ReceiveEvent | MessageFilter | BusoffAutoreset
            | ListenOnly | LogLocation | LogStatus | LogConfigure | ReceiveStatus
            | ControllerNumber | TraceLocation | TraceStatus | TraceSize | TraceConfigure
            | ChannelIdentifying | BitrateAdapting | AllowStatusFrames | AllowRtrFrames
            | AllowErrorFrames | InterframeDelay | AcceptanceFilter11Bit
            | AcceptanceFilter29Bit | IoDigitalConfiguration | IoDigitalValue
            | AllowEchoFrames | HardResetStatus => Access::ReadWrite,
        }
    }
}

/// A parameter value in one of the wire shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Integer(u32),
    Bitmask(u64),
    Text(String),
    Channels(Vec<ChannelInformation>),
}

impl ParameterValue {
    pub fn shape(&self) -> WireShape {
        match self {
            ParameterValue::Integer(_) => WireShape::Integer,
            ParameterValue::Bitmask(_) => WireShape::Bitmask64,
            ParameterValue::Text(_) => WireShape::Text,
            ParameterValue::Channels(_) => WireShape::ChannelArray,
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self {
            ParameterValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bitmask(&self) -> Option<u64> {
        match self {
            ParameterValue::Bitmask(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_channels(self) -> Option<Vec<ChannelInformation>> {
        match self {
            ParameterValue::Channels(channels) => Some(channels),
            _ => None,
        }
    }
}

impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<u64> for ParameterValue {
    fn from(value: u64) -> Self {
        ParameterValue::Bitmask(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(on: bool) -> Self {
        ParameterValue::Integer(if on { PARAMETER_ON } else { PARAMETER_OFF })
    }
}

impl From<FilterState> for ParameterValue {
    fn from(state: FilterState) -> Self {
        ParameterValue::Integer(state as u32)
    }
}

/// Zeroed buffer for reading a fixed-shape parameter.
pub(crate) fn get_buffer(id: ParameterId) -> Option<BytesMut> {
    id.shape().size().map(BytesMut::zeroed)
}

/// Encodes `value` into the buffer shape selected for `id`.
pub fn encode(id: ParameterId, value: &ParameterValue) -> Result<BytesMut> {
    match (id.shape(), value) {
        (WireShape::Integer, ParameterValue::Integer(value)) => {
            let mut dst = BytesMut::with_capacity(4);
            dst.put_u32_le(*value);
            Ok(dst)
        }
        (WireShape::Bitmask64, ParameterValue::Bitmask(value)) => {
            let mut dst = BytesMut::with_capacity(8);
            dst.put_u64_le(*value);
            Ok(dst)
        }
        (WireShape::Text, ParameterValue::Text(text)) => encode_text(text),
        _ => Err(CanError::ValueShape(id)),
    }
}

/// Decodes a fixed-shape parameter buffer filled by the driver.
pub fn decode(id: ParameterId, mut src: &[u8]) -> Result<ParameterValue> {
    let shape = id.shape();
    let need = shape.size().ok_or(CanError::ValueShape(id))?;
    if src.len() < need {
        return Err(CanError::BufferTooShort {
            need,
            got: src.len(),
        });
    }
    Ok(match shape {
        WireShape::Integer => ParameterValue::Integer(src.get_u32_le()),
        WireShape::Bitmask64 => ParameterValue::Bitmask(src.get_u64_le()),
        WireShape::Text => ParameterValue::Text(decode_text(src)),
        WireShape::ChannelArray => return Err(CanError::ValueShape(id)),
    })
}

/// NUL-terminated text in a [`TEXT_BUFFER_LEN`] byte buffer.
pub(crate) fn encode_text(text: &str) -> Result<BytesMut> {
    if text.len() >= TEXT_BUFFER_LEN || text.as_bytes().contains(&0) {
        return Err(CanError::TextTooLong {
            len: text.len(),
            max: TEXT_BUFFER_LEN - 1,
        });
    }
    let mut dst = BytesMut::with_capacity(TEXT_BUFFER_LEN);
    dst.put_slice(text.as_bytes());
    dst.put_bytes(0, TEXT_BUFFER_LEN - text.len());
    Ok(dst)
}

/// Text up to the first NUL, or the whole buffer if there is none.
pub(crate) fn decode_text(src: &[u8]) -> String {
    let end = src.iter().position(|b| *b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// Parameter is not set (inactive)
pub const PARAMETER_OFF: u32 = 0x00;
/// Parameter is set (active)
pub const PARAMETER_ON: u32 = 0x01;

/// Value of on/off parameters such as [`ParameterId::ListenOnly`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ParameterSwitch {
    Off = PARAMETER_OFF,
    On = PARAMETER_ON,
}

impl From<ParameterSwitch> for ParameterValue {
    fn from(switch: ParameterSwitch) -> Self {
        ParameterValue::Integer(switch as u32)
    }
}

/// Value of [`ParameterId::MessageFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FilterState {
    /// No messages are received
    Close = 0x00,
    /// All messages are received
    Open = 0x01,
    /// Only registered ranges are received
    Custom = 0x02,
}

impl FilterState {
    pub fn from_raw(value: u32) -> Option<FilterState> {
        match value {
            0x00 => Some(FilterState::Close),
            0x01 => Some(FilterState::Open),
            0x02 => Some(FilterState::Custom),
            _ => None,
        }
    }
}

/// Value of [`ParameterId::LanServiceStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ServiceStatus {
    Stopped = 0x01,
    Running = 0x04,
}

bitflags! {
    /// Value of [`ParameterId::ChannelFeatures`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        const FD_CAPABLE = 0x01;
        const DELAY_CAPABLE = 0x02;
        const IO_CAPABLE = 0x04;
        const XL_CAPABLE = 0x08;
    }
}

bitflags! {
    /// Value of [`ParameterId::LogConfigure`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LogFunction: u32 {
        const DEFAULT = 0x00;
        const ENTRY = 0x01;
        const PARAMETERS = 0x02;
        const LEAVE = 0x04;
        const WRITE = 0x08;
        const READ = 0x10;
        const ALL = 0xFFFF;
    }
}

bitflags! {
    /// Value of [`ParameterId::TraceConfigure`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TraceFile: u32 {
        const SINGLE = 0x00;
        const SEGMENTED = 0x01;
        const DATE = 0x02;
        const TIME = 0x04;
        const OVERWRITE = 0x80;
        const DATA_LENGTH = 0x100;
    }
}

bitflags! {
    /// Value of [`ParameterId::LanChannelDirection`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LanDirection: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}
