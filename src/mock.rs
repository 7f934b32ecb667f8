//! In-memory driver for tests.
//!
//! Simulates a set of attached channels with per-channel receive and
//! transmit queues, a parameter store, filters, error text and channel
//! lookup. Every call is recorded so tests can assert on exactly which
//! driver calls an operation made.

use crate::bitrate::{BitrateFd, BitrateXl};
use crate::discovery::{ChannelCondition, ChannelInformation, LookupQuery};
use crate::driver::{Call, Driver};
use crate::error::Result;
use crate::filter::FilterMode;
use crate::message::{Codec, Generation, Received};
use crate::parameter::{decode_text, encode_text, Features, ParameterId};
use crate::status::{Language, Status};
use crate::types::{Device, Handle};
use bytes::{BufMut, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default transmit queue depth per channel
pub const TX_QUEUE_SIZE: usize = 32;

/// Reported by the fake for [`ParameterId::ApiVersion`]
pub const API_VERSION: &str = "4.9.0.942";

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call: Call,
    pub handle: Handle,
    /// Buffer length handed to the driver
    pub len: usize,
    pub status: Status,
}

/// A channel the fake reports as attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChannel {
    pub info: ChannelInformation,
    pub ip_address: Option<String>,
    pub guid: Option<String>,
}

impl FakeChannel {
    pub fn new(
        handle: Handle,
        device: Device,
        controller: u8,
        features: Features,
        name: &str,
    ) -> Self {
        Self {
            info: ChannelInformation {
                handle,
                device_type: device.raw(),
                controller_number: controller,
                features,
                device_name: name.to_string(),
                device_id: 0,
                condition: ChannelCondition::AVAILABLE,
            },
            ip_address: None,
            guid: None,
        }
    }

    pub fn with_device_id(mut self, device_id: u32) -> Self {
        self.info.device_id = device_id;
        self
    }

    pub fn with_condition(mut self, condition: ChannelCondition) -> Self {
        self.info.condition = condition;
        self
    }

    pub fn with_ip_address(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn with_guid(mut self, guid: &str) -> Self {
        self.guid = Some(guid.to_string());
        self
    }
}

#[derive(Debug)]
struct OpenChannel {
    generation: Generation,
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    filters: Vec<(u32, u32, FilterMode)>,
}

#[derive(Debug, Default)]
struct State {
    channels: Vec<FakeChannel>,
    open: HashMap<Handle, OpenChannel>,
    values: HashMap<(Handle, ParameterId), Vec<u8>>,
    bus_status: HashMap<Handle, Status>,
    injected: Vec<(Call, Status)>,
    calls: Vec<CallRecord>,
    tx_capacity: usize,
    loopback: bool,
    clock_micros: u64,
    reported_count: Option<u32>,
}

/// In-memory [`Driver`]
#[derive(Debug)]
pub struct FakeDriver {
    state: Mutex<State>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    /// A driver with no attached channels.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tx_capacity: TX_QUEUE_SIZE,
                ..State::default()
            }),
        }
    }

    /// Two FD-capable USB channels, a classic PCI channel and an XL-capable
    /// LAN channel.
    pub fn with_default_channels() -> Self {
        let usb = |handle, controller, device_id| {
            FakeChannel::new(handle, Device::Usb, controller, Features::FD_CAPABLE, "PCAN-USB FD")
                .with_device_id(device_id)
        };
        Self::new()
            .with_channel(usb(Handle::USBBUS1, 0, 1))
            .with_channel(usb(Handle::USBBUS2, 1, 2))
            .with_channel(FakeChannel::new(
                Handle::PCIBUS1,
                Device::Pci,
                0,
                Features::empty(),
                "PCAN-PCI",
            ))
            .with_channel(
                FakeChannel::new(
                    Handle::LANBUS1,
                    Device::Lan,
                    0,
                    Features::FD_CAPABLE | Features::XL_CAPABLE,
                    "PCAN-Gateway",
                )
                .with_ip_address("192.168.1.10")
                .with_guid("{8A6B1F2E-0000-4C2D-9E11-000000000001}"),
            )
    }

    pub fn with_channel(self, channel: FakeChannel) -> Self {
        self.lock().channels.push(channel);
        self
    }

    /// Echoes every written message into the writer's receive queue.
    pub fn with_loopback(self) -> Self {
        self.lock().loopback = true;
        self
    }

    pub fn with_tx_capacity(self, capacity: usize) -> Self {
        self.lock().tx_capacity = capacity;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `call` return `status` without side effects.
    pub fn inject(&self, call: Call, status: Status) {
        self.lock().injected.push((call, status));
    }

    /// Overrides the attached channel count without changing the channel list.
    pub fn report_channel_count(&self, count: u32) {
        self.lock().reported_count = Some(count);
    }

    /// Sets the status reported by `GetStatus` for `handle`.
    pub fn set_bus_status(&self, handle: Handle, status: Status) {
        self.lock().bus_status.insert(handle, status);
    }

    /// Queues a received message on an open channel.
    pub fn push_received(&self, handle: Handle, received: &Received) -> Result<()> {
        let record = match received {
            Received::Classic(msg, ts) => {
                let mut buf = msg.encode()?;
                ts.encode(&mut buf);
                buf
            }
            Received::Fd(msg, ts) => {
                let mut buf = msg.encode()?;
                ts.encode(&mut buf);
                buf
            }
            Received::Xl(msg, ts) => {
                let mut buf = msg.encode()?;
                ts.encode(&mut buf);
                buf
            }
        };
        if let Some(channel) = self.lock().open.get_mut(&handle) {
            channel.rx.push_back(record.to_vec());
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn call_count(&self, call: Call) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|record| record.call == call)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Records written to `handle` and not yet cleared by a reset.
    pub fn transmitted(&self, handle: Handle) -> Vec<Vec<u8>> {
        self.lock()
            .open
            .get(&handle)
            .map(|channel| channel.tx.clone())
            .unwrap_or_default()
    }

    /// Ranges passed to `FilterMessages` on `handle`.
    pub fn filters(&self, handle: Handle) -> Vec<(u32, u32, FilterMode)> {
        self.lock()
            .open
            .get(&handle)
            .map(|channel| channel.filters.clone())
            .unwrap_or_default()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().open.len()
    }

    /// Handles the driver considers open, in ascending order.
    pub fn opened(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.lock().open.keys().copied().collect();
        handles.sort_unstable();
        handles
    }
}

impl Driver for FakeDriver {
    fn invoke(&self, call: Call, handle: Handle, buffer: &mut [u8]) -> Status {
        let mut state = self.lock();
        let injected = state.injected.iter().position(|(c, _)| *c == call);
        let status = match injected {
            Some(index) => state.injected.remove(index).1,
            None => state.dispatch(call, handle, buffer),
        };
        state.calls.push(CallRecord {
            call,
            handle,
            len: buffer.len(),
            status,
        });
        status
    }
}

impl State {
    fn dispatch(&mut self, call: Call, handle: Handle, buffer: &mut [u8]) -> Status {
        match call {
            Call::Initialize => self.initialize(handle, Generation::Classic, buffer),
            Call::InitializeFd => self.initialize(handle, Generation::Fd, buffer),
            Call::InitializeXl => self.initialize(handle, Generation::Xl, buffer),
            Call::Uninitialize => self.uninitialize(handle),
            Call::Reset => match self.open.get_mut(&handle) {
                Some(channel) => {
                    channel.rx.clear();
                    channel.tx.clear();
                    Status::OK
                }
                None => Status::INITIALIZE,
            },
            Call::GetStatus => match self.open.get(&handle) {
                Some(_) => self.bus_status.get(&handle).copied().unwrap_or(Status::OK),
                None => Status::INITIALIZE,
            },
            Call::Read => self.read(handle, Generation::Classic, buffer),
            Call::ReadFd => self.read(handle, Generation::Fd, buffer),
            Call::ReadXl => self.read(handle, Generation::Xl, buffer),
            Call::Write => self.write(handle, Generation::Classic, buffer),
            Call::WriteFd => self.write(handle, Generation::Fd, buffer),
            Call::WriteXl => self.write(handle, Generation::Xl, buffer),
            Call::FilterMessages { from, to, mode } => match self.open.get_mut(&handle) {
                Some(channel) => {
                    channel.filters.push((from, to, mode));
                    Status::OK
                }
                None => Status::INITIALIZE,
            },
            Call::GetValue(id) => self.get_value(handle, id, buffer),
            Call::SetValue(id) => {
                self.values.insert((handle, id), buffer.to_vec());
                Status::OK
            }
            Call::GetErrorText { error, language } => error_text(error, language, buffer),
            Call::LookUpChannel => self.lookup(buffer),
        }
    }

    fn channel(&self, handle: Handle) -> Option<&FakeChannel> {
        self.channels
            .iter()
            .find(|channel| channel.info.handle == handle)
    }

    fn initialize(&mut self, handle: Handle, generation: Generation, buffer: &[u8]) -> Status {
        let Some(channel) = self.channel(handle) else {
            return Status::ILLHW;
        };
        if self.open.contains_key(&handle) {
            return Status::ILLOPERATION;
        }
        if !channel.info.condition.is_connectable() {
            return Status::HWINUSE;
        }
        let features = channel.info.features;
        let valid = match generation {
            Generation::Classic => buffer.len() == 2,
            Generation::Fd => {
                if !features.contains(Features::FD_CAPABLE) {
                    return Status::ILLOPERATION;
                }
                BitrateFd::parse(&decode_text(buffer)).is_ok()
            }
            Generation::Xl => {
                if !features.contains(Features::XL_CAPABLE) {
                    return Status::ILLOPERATION;
                }
                BitrateXl::parse(&decode_text(buffer)).is_ok()
            }
        };
        if !valid {
            return Status::ILLPARAMVAL;
        }
        self.open.insert(
            handle,
            OpenChannel {
                generation,
                rx: VecDeque::new(),
                tx: Vec::new(),
                filters: Vec::new(),
            },
        );
        Status::OK
    }

    fn uninitialize(&mut self, handle: Handle) -> Status {
        if handle.is_none() {
            self.open.clear();
            return Status::OK;
        }
        match self.open.remove(&handle) {
            Some(_) => Status::OK,
            None => Status::INITIALIZE,
        }
    }

    fn read(&mut self, handle: Handle, generation: Generation, buffer: &mut [u8]) -> Status {
        let Some(channel) = self.open.get_mut(&handle) else {
            return Status::INITIALIZE;
        };
        if channel.generation != generation {
            return Status::ILLOPERATION;
        }
        match channel.rx.pop_front() {
            Some(record) if record.len() <= buffer.len() => {
                buffer[..record.len()].copy_from_slice(&record);
                Status::OK
            }
            Some(_) => Status::ILLPARAMVAL,
            None => Status::QRCVEMPTY,
        }
    }

    fn write(&mut self, handle: Handle, generation: Generation, buffer: &[u8]) -> Status {
        let capacity = self.tx_capacity;
        let loopback = self.loopback;
        self.clock_micros += 1_000;
        let now = self.clock_micros;
        let Some(channel) = self.open.get_mut(&handle) else {
            return Status::INITIALIZE;
        };
        if channel.generation != generation {
            return Status::ILLOPERATION;
        }
        if channel.tx.len() >= capacity {
            return Status::QXMTFULL;
        }
        channel.tx.push(buffer.to_vec());
        if loopback {
            let mut record = BytesMut::from(buffer);
            match generation {
                Generation::Classic | Generation::Fd => {
                    let millis = now / 1_000;
                    record.put_u32_le(millis as u32);
                    record.put_u16_le((millis >> 32) as u16);
                    record.put_u16_le((now % 1_000) as u16);
                }
                Generation::Xl => record.put_u64_le(now),
            }
            channel.rx.push_back(record.to_vec());
        }
        Status::OK
    }

    fn get_value(&self, handle: Handle, id: ParameterId, buffer: &mut [u8]) -> Status {
        let value: Option<Vec<u8>> = match id {
            ParameterId::ApiVersion => encode_text(API_VERSION).ok().map(|buf| buf.to_vec()),
            ParameterId::AttachedChannelsCount => {
                let count = self
                    .reported_count
                    .unwrap_or(self.channels.len() as u32);
                Some(count.to_le_bytes().to_vec())
            }
            ParameterId::AttachedChannels => {
                let mut dst = BytesMut::new();
                let fits = buffer.len() / ChannelInformation::WIRE_SIZE;
                for channel in self.channels.iter().take(fits) {
                    if channel.info.encode(&mut dst).is_err() {
                        return Status::UNKNOWN;
                    }
                }
                Some(dst.to_vec())
            }
            ParameterId::ChannelCondition => Some(
                self.channel(handle)
                    .map(|channel| channel.info.condition)
                    .unwrap_or(ChannelCondition::UNAVAILABLE)
                    .bits()
                    .to_le_bytes()
                    .to_vec(),
            ),
            _ => self
                .values
                .get(&(handle, id))
                .or_else(|| self.values.get(&(Handle::NONE, id)))
                .cloned()
                .or_else(|| self.channel_value(handle, id)),
        };
        match value {
            Some(value) => {
                let len = value.len().min(buffer.len());
                buffer[..len].copy_from_slice(&value[..len]);
                Status::OK
            }
            None => Status::ILLPARAMTYPE,
        }
    }

    /// Values derived from the channel description.
    fn channel_value(&self, handle: Handle, id: ParameterId) -> Option<Vec<u8>> {
        let channel = self.channel(handle)?;
        let integer = |value: u32| Some(value.to_le_bytes().to_vec());
        match id {
            ParameterId::DeviceId => integer(channel.info.device_id),
            ParameterId::ControllerNumber => integer(u32::from(channel.info.controller_number)),
            ParameterId::ChannelFeatures => integer(channel.info.features.bits()),
            ParameterId::HardwareName => encode_text(&channel.info.device_name)
                .ok()
                .map(|buf| buf.to_vec()),
            ParameterId::IpAddress => channel
                .ip_address
                .as_deref()
                .and_then(|ip| encode_text(ip).ok())
                .map(|buf| buf.to_vec()),
            ParameterId::DeviceGuid => channel
                .guid
                .as_deref()
                .and_then(|guid| encode_text(guid).ok())
                .map(|buf| buf.to_vec()),
            _ => None,
        }
    }

    fn lookup(&self, buffer: &mut [u8]) -> Status {
        let Ok(query) = LookupQuery::parse(&decode_text(buffer)) else {
            return Status::ILLPARAMVAL;
        };
        let found = self
            .channels
            .iter()
            .find(|channel| {
                query.matches(
                    &channel.info,
                    channel.ip_address.as_deref(),
                    channel.guid.as_deref(),
                )
            })
            .map(|channel| channel.info.handle)
            .unwrap_or(Handle::NONE);
        if buffer.len() < 2 {
            return Status::ILLPARAMVAL;
        }
        buffer[..2].copy_from_slice(&found.0.to_le_bytes());
        Status::OK
    }
}

fn error_text(error: Status, language: Language, buffer: &mut [u8]) -> Status {
    let text = match language {
        Language::German if error.is_ok() => "Kein Fehler".to_string(),
        _ => error.description(),
    };
    match encode_text(&text) {
        Ok(encoded) if encoded.len() <= buffer.len() => {
            buffer[..encoded.len()].copy_from_slice(&encoded);
            Status::OK
        }
        _ => Status::ILLPARAMVAL,
    }
}
