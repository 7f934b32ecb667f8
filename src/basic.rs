//! The handle-addressed API tying lifecycle, parameters and codecs to a driver.

use crate::bitrate::{Bitrate, BitrateFd, BitrateXl};
use crate::discovery::{ChannelInformation, LookupQuery, MAX_ATTACHED_CHANNELS};
use crate::driver::{invoke, Call, Driver};
use crate::error::{check, CanError, Result};
use crate::filter::{validate_range, AcceptanceFilter, FilterMode};
use crate::lifecycle::{ensure_known, HandleTable};
use crate::message::{
    CanMessage, Codec, FdMessage, Generation, Message, Received, Timestamp, TimestampXl,
    XlMessage,
};
use crate::parameter::{
    self, decode_text, encode_text, FilterState, ParameterId, ParameterValue, WireShape,
    TEXT_BUFFER_LEN,
};
use crate::status::{Language, Status};
use crate::types::{Config, Handle};
use bytes::{Buf, BytesMut};

/// Host-side front end of a CAN interface driver.
///
/// One instance owns the table of initialized handles. It is `Send + Sync`
/// whenever the driver is; calls on distinct handles may run in parallel.
pub struct CanBasic<D: Driver> {
    driver: D,
    table: HandleTable,
}

impl<D: Driver> CanBasic<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            table: HandleTable::new(),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_initialized(&self, handle: Handle) -> bool {
        self.table.is_initialized(handle)
    }

    /// Handles currently initialized through this instance.
    pub fn initialized_handles(&self) -> Vec<Handle> {
        self.table.handles()
    }

    /// Generation `handle` was initialized for.
    pub fn generation(&self, handle: Handle) -> Result<Generation> {
        self.table.generation(handle)
    }

    /// Initializes `handle`; the bit rate variant selects the generation.
    pub fn initialize(&self, handle: Handle, bitrate: impl Into<Bitrate>) -> Result<Status> {
        let bitrate = bitrate.into();
        ensure_known(handle)?;
        bitrate.validate()?;
        let generation = bitrate.generation();
        let call = match generation {
            Generation::Classic => Call::Initialize,
            Generation::Fd => Call::InitializeFd,
            Generation::Xl => Call::InitializeXl,
        };
        let mut buf = bitrate.encode()?;
        self.table.initialize(handle, generation, || {
            invoke(&self.driver, call, handle, &mut buf)
        })
    }

    pub fn initialize_fd(&self, handle: Handle, bitrate: &BitrateFd) -> Result<Status> {
        self.initialize(handle, Bitrate::Fd(bitrate.clone()))
    }

    pub fn initialize_xl(&self, handle: Handle, bitrate: &BitrateXl) -> Result<Status> {
        self.initialize(handle, Bitrate::Xl(bitrate.clone()))
    }

    /// Uninitializes `handle`, or every channel for [`Handle::NONE`].
    pub fn uninitialize(&self, handle: Handle) -> Result<Status> {
        self.table.uninitialize(handle, || {
            invoke(&self.driver, Call::Uninitialize, handle, &mut [])
        })
    }

    /// Clears the receive and transmit queues of `handle`.
    pub fn reset(&self, handle: Handle) -> Result<Status> {
        self.table.generation(handle)?;
        check(invoke(&self.driver, Call::Reset, handle, &mut []))
    }

    /// Bus and queue condition of `handle`.
    ///
    /// Bus conditions such as `BUSOFF` are returned as `Ok`; only statuses
    /// saying the call itself failed become errors.
    pub fn get_status(&self, handle: Handle) -> Result<Status> {
        self.table.generation(handle)?;
        let status = invoke(&self.driver, Call::GetStatus, handle, &mut []);
        let failed = Status::NODRIVER | Status::INITIALIZE | Status::ILLOPERATION;
        if status.is_illegal_handle() || status.intersects(failed) {
            return Err(CanError::Status(status));
        }
        Ok(status)
    }

    fn read_as<C: Codec>(&self, handle: Handle, call: Call) -> Result<(C, C::Timestamp)> {
        self.table.expect(handle, C::GENERATION)?;
        let mut buf = C::read_buffer();
        check(invoke(&self.driver, call, handle, &mut buf))?;
        C::decode_read(&buf)
    }

    /// Pops one message from a classic channel's receive queue.
    ///
    /// Never blocks; an empty queue is an error for which
    /// [`CanError::is_queue_empty`] holds.
    pub fn read(&self, handle: Handle) -> Result<(CanMessage, Timestamp)> {
        self.read_as(handle, Call::Read)
    }

    pub fn read_fd(&self, handle: Handle) -> Result<(FdMessage, Timestamp)> {
        self.read_as(handle, Call::ReadFd)
    }

    pub fn read_xl(&self, handle: Handle) -> Result<(XlMessage, TimestampXl)> {
        self.read_as(handle, Call::ReadXl)
    }

    /// Reads with the codec of whatever generation `handle` was opened for.
    pub fn read_any(&self, handle: Handle) -> Result<Received> {
        match self.table.generation(handle)? {
            Generation::Classic => self
                .read(handle)
                .map(|(msg, ts)| Received::Classic(msg, ts)),
            Generation::Fd => self.read_fd(handle).map(|(msg, ts)| Received::Fd(msg, ts)),
            Generation::Xl => self.read_xl(handle).map(|(msg, ts)| Received::Xl(msg, ts)),
        }
    }

    fn write_as<C: Codec>(&self, handle: Handle, msg: &C, call: Call) -> Result<Status> {
        self.table.expect(handle, C::GENERATION)?;
        let mut buf: BytesMut = msg.encode()?;
        check(invoke(&self.driver, call, handle, &mut buf))
    }

    /// Queues a message for transmission on a classic channel.
    ///
    /// A full transmit queue is an error for which
    /// [`CanError::is_transmit_full`] holds.
    pub fn write(&self, handle: Handle, msg: &CanMessage) -> Result<Status> {
        self.write_as(handle, msg, Call::Write)
    }

    pub fn write_fd(&self, handle: Handle, msg: &FdMessage) -> Result<Status> {
        self.write_as(handle, msg, Call::WriteFd)
    }

    pub fn write_xl(&self, handle: Handle, msg: &XlMessage) -> Result<Status> {
        self.write_as(handle, msg, Call::WriteXl)
    }

    pub fn write_any(&self, handle: Handle, msg: &Message) -> Result<Status> {
        match msg {
            Message::Classic(msg) => self.write(handle, msg),
            Message::Fd(msg) => self.write_fd(handle, msg),
            Message::Xl(msg) => self.write_xl(handle, msg),
        }
    }

    /// Widens the acceptance filter of `handle` by `from..=to`.
    pub fn filter_messages(
        &self,
        handle: Handle,
        from: u32,
        to: u32,
        mode: FilterMode,
    ) -> Result<Status> {
        validate_range(from, to, mode)?;
        self.table.generation(handle)?;
        let call = Call::FilterMessages { from, to, mode };
        let status = check(invoke(&self.driver, call, handle, &mut []))?;
        self.table
            .with_filter(handle, |filter| filter.add(from, to, mode))??;
        Ok(status)
    }

    /// Host-side view of what `handle` currently accepts.
    pub fn acceptance_filter(&self, handle: Handle) -> Result<AcceptanceFilter> {
        self.table.with_filter(handle, |filter| filter.clone())
    }

    /// Reads a parameter of `handle` ([`Handle::NONE`] for global ones).
    pub fn get_value(&self, handle: Handle, id: ParameterId) -> Result<ParameterValue> {
        if !id.access().readable() {
            return Err(CanError::NotReadable(id));
        }
        if id.shape() == WireShape::ChannelArray {
            return self.attached_channels(handle).map(ParameterValue::Channels);
        }
        let mut buf = parameter::get_buffer(id).ok_or(CanError::ValueShape(id))?;
        check(invoke(&self.driver, Call::GetValue(id), handle, &mut buf))?;
        parameter::decode(id, &buf)
    }

    /// Writes a parameter of `handle` ([`Handle::NONE`] for global ones).
    pub fn set_value(
        &self,
        handle: Handle,
        id: ParameterId,
        value: impl Into<ParameterValue>,
    ) -> Result<Status> {
        if !id.access().writable() {
            return Err(CanError::NotWritable(id));
        }
        let value = value.into();
        let mut buf = parameter::encode(id, &value)?;
        let status = check(invoke(&self.driver, Call::SetValue(id), handle, &mut buf))?;
        if id == ParameterId::MessageFilter {
            if let Some(state) = value.as_integer().and_then(FilterState::from_raw) {
                // Handles opened outside this instance have no mirror
                let _ = self.table.with_filter(handle, |filter| filter.reset(state));
            }
        }
        Ok(status)
    }

    /// Every channel attached to the system.
    ///
    /// Reads the channel count first; only if that succeeds is the array
    /// read, sized to exactly that count. A count above
    /// [`MAX_ATTACHED_CHANNELS`] is rejected before anything is allocated.
    pub fn attached_channels(&self, handle: Handle) -> Result<Vec<ChannelInformation>> {
        let count_id = ParameterId::AttachedChannelsCount;
        let mut buf = parameter::get_buffer(count_id).ok_or(CanError::ValueShape(count_id))?;
        check(invoke(&self.driver, Call::GetValue(count_id), handle, &mut buf))?;
        let raw_count = buf.get_u32_le();
        let size = usize::try_from(raw_count)
            .ok()
            .filter(|count| *count <= MAX_ATTACHED_CHANNELS)
            .and_then(|count| count.checked_mul(ChannelInformation::WIRE_SIZE))
            .ok_or(CanError::ChannelCount(raw_count))?;
        let count = size / ChannelInformation::WIRE_SIZE;
        tracing::debug!(count, "reading attached channels");

        let mut buf = BytesMut::zeroed(size);
        let call = Call::GetValue(ParameterId::AttachedChannels);
        check(invoke(&self.driver, call, handle, &mut buf))?;
        ChannelInformation::decode_array(&buf, count)
    }

    /// Driver-provided text for `error` in `language`.
    pub fn get_error_text(&self, error: Status, language: Language) -> Result<String> {
        let mut buf = BytesMut::zeroed(TEXT_BUFFER_LEN);
        let call = Call::GetErrorText { error, language };
        check(invoke(&self.driver, call, Handle::NONE, &mut buf))?;
        Ok(decode_text(&buf))
    }

    /// First channel matching every predicate of `query`.
    pub fn lookup_channel(&self, query: &LookupQuery) -> Result<Handle> {
        query.validate()?;
        let mut buf = encode_text(&query.to_string())?;
        check(invoke(&self.driver, Call::LookUpChannel, Handle::NONE, &mut buf))?;
        match Handle(buf.get_u16_le()) {
            Handle::NONE => Err(CanError::Status(Status::REGTEST)),
            handle => Ok(handle),
        }
    }

    /// Parses a `key=value,...` query and looks it up.
    pub fn lookup_channel_str(&self, query: &str) -> Result<Handle> {
        self.lookup_channel(&LookupQuery::parse(query)?)
    }
}
