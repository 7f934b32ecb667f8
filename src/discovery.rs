//! Channel discovery: channel information records and lookup queries.

use crate::error::{CanError, Result};
use crate::message::ensure_len;
use crate::parameter::Features;
use crate::types::{Config, Device, Handle};
use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::net::Ipv4Addr;

/// Maximum length of a device name: 32 characters + terminator
pub const MAX_LENGTH_HARDWARE_NAME: usize = 33;

/// Most channels a system can report: 16 in each of the four handle families
pub const MAX_ATTACHED_CHANNELS: usize = 64;

bitflags! {
    /// Availability of a channel.
    ///
    /// `UNAVAILABLE` is the empty set; `PCANVIEW` is "occupied but still
    /// connectable".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelCondition: u32 {
        const UNAVAILABLE = 0x00;
        const AVAILABLE = 0x01;
        const OCCUPIED = 0x02;
        const PCANVIEW = Self::AVAILABLE.bits() | Self::OCCUPIED.bits();
    }
}

impl ChannelCondition {
    /// A client can connect to the channel.
    pub fn is_connectable(self) -> bool {
        self.contains(ChannelCondition::AVAILABLE)
    }
}

/// One attached channel, as reported by the attached-channels parameter.
///
/// Wire layout, 52 bytes:
/// ```text
/// offset  0  channel_handle     u16
/// offset  2  device_type        u8
/// offset  3  controller_number  u8
/// offset  4  device_features    u32
/// offset  8  device_name        [u8; 33]
/// offset 41  padding            [u8; 3]
/// offset 44  device_id          u32
/// offset 48  channel_condition  u32
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInformation {
    pub handle: Handle,
    pub device_type: u8,
    pub controller_number: u8,
    pub features: Features,
    pub device_name: String,
    pub device_id: u32,
    pub condition: ChannelCondition,
}

impl ChannelInformation {
    pub const WIRE_SIZE: usize = 52;

    pub fn device(&self) -> Option<Device> {
        Device::from_raw(self.device_type)
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let name = self.device_name.as_bytes();
        if name.len() >= MAX_LENGTH_HARDWARE_NAME {
            return Err(CanError::TextTooLong {
                len: name.len(),
                max: MAX_LENGTH_HARDWARE_NAME - 1,
            });
        }
        dst.put_u16_le(self.handle.0);
        dst.put_u8(self.device_type);
        dst.put_u8(self.controller_number);
        dst.put_u32_le(self.features.bits());
        dst.put_slice(name);
        dst.put_bytes(0, MAX_LENGTH_HARDWARE_NAME - name.len() + 3);
        dst.put_u32_le(self.device_id);
        dst.put_u32_le(self.condition.bits());
        Ok(())
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        ensure_len(src, Self::WIRE_SIZE)?;
        let handle = Handle(src.get_u16_le());
        let device_type = src.get_u8();
        let controller_number = src.get_u8();
        let features = Features::from_bits_retain(src.get_u32_le());
        let device_name = crate::parameter::decode_text(&src[..MAX_LENGTH_HARDWARE_NAME]);
        src.advance(MAX_LENGTH_HARDWARE_NAME + 3);
        let device_id = src.get_u32_le();
        let condition = ChannelCondition::from_bits_retain(src.get_u32_le());
        Ok(Self {
            handle,
            device_type,
            controller_number,
            features,
            device_name,
            device_id,
            condition,
        })
    }

    /// Decodes `count` consecutive records.
    pub fn decode_array(src: &[u8], count: usize) -> Result<Vec<Self>> {
        ensure_len(src, count * Self::WIRE_SIZE)?;
        src.chunks_exact(Self::WIRE_SIZE)
            .take(count)
            .map(Self::decode)
            .collect()
    }
}

/// Keys accepted in a lookup query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKey {
    DeviceType,
    DeviceId,
    ControllerNumber,
    IpAddress,
    DeviceGuid,
}

impl LookupKey {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupKey::DeviceType => "devicetype",
            LookupKey::DeviceId => "deviceid",
            LookupKey::ControllerNumber => "controllernumber",
            LookupKey::IpAddress => "ipaddress",
            LookupKey::DeviceGuid => "deviceguid",
        }
    }

    pub fn parse(key: &str) -> Option<LookupKey> {
        match key.trim().to_ascii_lowercase().as_str() {
            "devicetype" => Some(LookupKey::DeviceType),
            "deviceid" => Some(LookupKey::DeviceId),
            "controllernumber" => Some(LookupKey::ControllerNumber),
            "ipaddress" => Some(LookupKey::IpAddress),
            "deviceguid" => Some(LookupKey::DeviceGuid),
            _ => None,
        }
    }
}

impl Device {
    /// Name used for the device type in lookup queries.
    pub fn lookup_name(self) -> &'static str {
        match self {
            Device::None => "PCAN_NONE",
            Device::Pci => "PCAN_PCI",
            Device::Usb => "PCAN_USB",
            Device::Lan => "PCAN_LAN",
        }
    }

    pub fn parse_lookup(value: &str) -> Option<Device> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PCAN_NONE" => Some(Device::None),
            "PCAN_PCI" => Some(Device::Pci),
            "PCAN_USB" => Some(Device::Usb),
            "PCAN_LAN" => Some(Device::Lan),
            other => parse_number(other)
                .and_then(|raw| u8::try_from(raw).ok())
                .and_then(Device::from_raw),
        }
    }
}

/// Decimal or `0x` hexadecimal number.
fn parse_number(value: &str) -> Option<u32> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// A parsed `key=value,key=value` channel lookup query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    predicates: Vec<(LookupKey, String)>,
}

impl LookupQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_type(self, device: Device) -> Self {
        self.with(LookupKey::DeviceType, device.lookup_name())
    }

    pub fn device_id(self, id: u32) -> Self {
        self.with(LookupKey::DeviceId, &id.to_string())
    }

    pub fn controller_number(self, number: u8) -> Self {
        self.with(LookupKey::ControllerNumber, &number.to_string())
    }

    pub fn ip_address(self, address: Ipv4Addr) -> Self {
        self.with(LookupKey::IpAddress, &address.to_string())
    }

    pub fn device_guid(self, guid: &str) -> Self {
        self.with(LookupKey::DeviceGuid, guid)
    }

    fn with(mut self, key: LookupKey, value: &str) -> Self {
        self.predicates.retain(|(existing, _)| *existing != key);
        self.predicates.push((key, value.to_string()));
        self
    }

    pub fn predicates(&self) -> &[(LookupKey, String)] {
        &self.predicates
    }

    pub fn get(&self, key: LookupKey) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Parses and validates a query string.
    pub fn parse(query: &str) -> Result<Self> {
        let mut predicates = Vec::new();
        for pair in query.split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CanError::Lookup(format!("expected key=value, got {pair:?}")))?;
            let key = LookupKey::parse(key)
                .ok_or_else(|| CanError::Lookup(format!("unknown key {:?}", key.trim())))?;
            if predicates.iter().any(|(existing, _)| *existing == key) {
                return Err(CanError::Lookup(format!("duplicate key {}", key.as_str())));
            }
            predicates.push((key, value.trim().to_string()));
        }
        let query = Self { predicates };
        query.validate()?;
        Ok(query)
    }

    /// True if every device-record predicate matches `info`.
    ///
    /// `ipaddress` and `deviceguid` are not part of the record and are
    /// matched against `ip` and `guid` when given.
    pub fn matches(&self, info: &ChannelInformation, ip: Option<&str>, guid: Option<&str>) -> bool {
        self.predicates.iter().all(|(key, value)| match key {
            LookupKey::DeviceType => Device::parse_lookup(value) == info.device(),
            LookupKey::DeviceId => parse_number(value) == Some(info.device_id),
            LookupKey::ControllerNumber => {
                parse_number(value) == Some(u32::from(info.controller_number))
            }
            LookupKey::IpAddress => ip == Some(value.as_str()),
            LookupKey::DeviceGuid => guid.is_some_and(|g| g.eq_ignore_ascii_case(value)),
        })
    }
}

impl Config for LookupQuery {
    fn validate(&self) -> Result<()> {
        if self.predicates.is_empty() {
            return Err(CanError::Lookup("query is empty".to_string()));
        }
        for (key, value) in &self.predicates {
            let valid = match key {
                LookupKey::DeviceType => Device::parse_lookup(value).is_some(),
                LookupKey::DeviceId => parse_number(value).is_some(),
                LookupKey::ControllerNumber => {
                    parse_number(value).is_some_and(|n| n <= u32::from(u8::MAX))
                }
                LookupKey::IpAddress => value.parse::<Ipv4Addr>().is_ok(),
                LookupKey::DeviceGuid => !value.is_empty(),
            };
            if !valid {
                return Err(CanError::Lookup(format!(
                    "invalid value {value:?} for {}",
                    key.as_str()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for LookupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.predicates.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key.as_str(), value)?;
        }
        Ok(())
    }
}
